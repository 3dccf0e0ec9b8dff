fn main() {
    pulse_reduce::cli::run()
}
