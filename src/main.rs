fn main() -> std::process::ExitCode {
    invoice_reconciler_lib::run()
}
