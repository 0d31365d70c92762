//! beanroot-check - Load a ledger, report errors and print balances.

fn main() -> std::process::ExitCode {
    beanroot::cmd::check::main()
}
