use std::{
    error::Error,
    io::{self, Write},
    net::SocketAddr,
};

use clap::Parser;
use log::info;
use quill::{Client, Command, ConsistencyLevel, cli::render, prompt};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Address of the server to connect to
    address: SocketAddr,
    /// Consistency level used for queries until changed with `.consistency`
    #[arg(short, long, default_value = "ONE")]
    consistency: ConsistencyLevel,
    /// Run a single query and exit
    #[arg(short, long)]
    execute: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let mut client = Client::connect(cli.address)?;
    let mut consistency = cli.consistency;
    info!("connected to {}", cli.address);

    if let Some(query) = cli.execute {
        println!("{}", render(&client.query(&query, consistency)?));
        return Ok(());
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        let cmd = match prompt(stdin.lock(), stdout.lock()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match cmd {
            Command::Exit => break,
            Command::Consistency(level) => {
                consistency = level;
                println!("consistency level set to {consistency}");
            }
            Command::Query(query) if query.is_empty() => {}
            Command::Query(query) => match client.query(&query, consistency) {
                Ok(response) => println!("{}", render(&response)),
                Err(e) => {
                    eprintln!("query failed: {e}");
                    break;
                }
            },
        }
    }

    stdout.flush()?;
    Ok(())
}
