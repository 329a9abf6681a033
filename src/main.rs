use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::process;

use clap::error::ErrorKind;
use clap::{Arg, Command};
use log::error;

use ext2_history::error::Result;
use ext2_history::{reconstruct, timeline};

fn run(image_path: &str, state_path: &str, history_path: &str) -> Result<()> {
    let image = File::open(image_path)?;
    let reconstruction = reconstruct(BufReader::new(image))?;

    let mut state_out = BufWriter::new(File::create(state_path)?);
    state_out.write_all(&reconstruction.tree)?;
    state_out.flush()?;

    let mut history_out = BufWriter::new(File::create(history_path)?);
    timeline::render(&reconstruction.actions, &mut history_out)?;
    history_out.flush()?;

    Ok(())
}

fn main() {
    env_logger::init();

    let matches = Command::new("ext2-history")
        .version("0.1.0")
        .about("Reconstruct the directory tree and user action history from an ext2 image.")
        .arg(
            Arg::new("image")
                .required(true)
                .help("The path to the raw ext2 image."),
        )
        .arg(
            Arg::new("state_output")
                .required(true)
                .help("Output path for the augmented directory tree."),
        )
        .arg(
            Arg::new("history_output")
                .required(true)
                .help("Output path for the recovered action history."),
        )
        .try_get_matches()
        .unwrap_or_else(|err| {
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            process::exit(code);
        });

    let image_path = matches.get_one::<String>("image").unwrap();
    let state_path = matches.get_one::<String>("state_output").unwrap();
    let history_path = matches.get_one::<String>("history_output").unwrap();

    if let Err(err) = run(image_path, state_path, history_path) {
        error!("{}", err);
        eprintln!("ext2-history: {}", err);
        process::exit(1);
    }
}
