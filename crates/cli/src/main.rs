use std::process::ExitCode;

fn main() -> ExitCode {
    livequote_cli::run()
}
