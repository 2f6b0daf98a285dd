use std::process::ExitCode;

fn main() -> ExitCode {
    bongo_app_lib::run()
}
