use std::process::ExitCode;

fn main() -> ExitCode {
    atendia_cli::run()
}
