mod console;
mod logger;
mod parse_args;

use console::{execute, ConsoleCommand, CONSOLE_HELP};
use devrelay_bridge::{Listener, Requestor};
use logger::Logger;
use parse_args::parse_args;

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, Sender};

fn main() {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error parsing arguments: {}", e);
            std::process::exit(1);
        }
    };

    // Set up logger
    let logger = match &args.log_file {
        Some(path) => match Logger::file(path, args.verbosity) {
            Ok(l) => {
                eprintln!("Logging to: {}", path);
                l
            }
            Err(e) => {
                eprintln!("Failed to open log file '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        None => Logger::stderr(args.verbosity),
    };
    if let Err(e) = logger.install() {
        eprintln!("Failed to install logger: {}", e);
    }

    let config = args.relay_config();
    let requestor = Requestor::new(config.response_timeout);
    let listener = Listener::new(config, requestor);

    match listener.start() {
        Ok(addr) => eprintln!("Relay listening on {}", addr),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
    eprintln!("Type 'help' for commands.");

    // Stdin reader thread; dropping the sender on EOF ends the console
    let (tx_stdin, rx_stdin): (Sender<String>, Receiver<String>) = mpsc::channel();
    let _stdin_thread = std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if tx_stdin.send(l).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    prompt();
    while let Ok(line) = rx_stdin.recv() {
        match ConsoleCommand::parse(&line) {
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => println!("{}", execute(&listener, &command)),
            Ok(None) => {}
            Err(e) => println!("{}\n{}", e, CONSOLE_HELP),
        }
        prompt();
    }

    eprintln!("Stopping relay...");
    listener.stop();
}

fn prompt() {
    print!("relay> ");
    let _ = io::stdout().flush();
}
