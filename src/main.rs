use std::process::ExitCode;

fn main() -> ExitCode {
    dicomscan::app::run()
}
