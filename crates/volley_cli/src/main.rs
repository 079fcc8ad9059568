fn main() -> volley_cli::ExitStatus {
    volley_cli::volley_main()
}
