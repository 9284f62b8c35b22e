use std::process::ExitCode;

fn main() -> ExitCode {
    match buildvariant::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}
