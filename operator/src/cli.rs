use anyhow::Result;
use clap::Parser;
use std::env::current_dir;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Opts {
    /// Where to permanently store data, defaults to the current working directory.
    #[clap(long)]
    data_dir: Option<PathBuf>,

    /// If enabled logs will be in json format
    #[clap(short, long)]
    pub json: bool,

    /// The address to bind the operator service on. Keep this on localhost
    /// unless an authenticating proxy sits in front.
    #[clap(long, default_value = "127.0.0.1")]
    pub listen_host: String,
}

impl Opts {
    // use this method to parse the options from the cli.
    pub fn read() -> Opts {
        Opts::parse()
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = match self.data_dir.clone() {
            None => current_dir()?.join("data"),
            Some(path) => path,
        }
        .join("operator");

        Ok(data_dir)
    }
}
