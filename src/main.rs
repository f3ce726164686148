fn main() {
    std::process::exit(uartscope_lib::cli::run());
}
