mod cmd;

use std::process::ExitCode;

use clap::error::ErrorKind as ArgsErrorKind;
use clap::Parser;

use cmd::{App, RunCommand};

/// Exit code for anything that kept the command from reaching a decision.
const FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let app = match App::try_parse() {
        Ok(app) => app,
        Err(err) => {
            let _ = err.print();
            if matches!(
                err.kind(),
                ArgsErrorKind::DisplayHelp
                    | ArgsErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                    | ArgsErrorKind::DisplayVersion
            ) {
                return ExitCode::SUCCESS;
            }
            return ExitCode::from(FATAL);
        }
    };

    match app.run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Fatal: {err:#}");
            ExitCode::from(FATAL)
        }
    }
}
