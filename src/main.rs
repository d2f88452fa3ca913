use clap::Parser;
use colored::*;
use podsh::shell::{self, ExecOptions, ShellState};
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Interactive shell for a hierarchical resource pod
#[derive(Debug, Parser)]
#[command(name = "podsh", version, about)]
struct Cli {
    /// Root locator every path lives under
    #[arg(long, env = "PODSH_ROOT", default_value = "https://pod.example/")]
    root: String,

    /// Run a command line and exit (repeatable)
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    commands: Vec<String>,

    /// Print headless results as JSON
    #[arg(long)]
    json: bool,

    /// Keep running -c lines after one fails
    #[arg(long)]
    keep_going: bool,

    /// Do not read or write the history file
    #[arg(long)]
    no_history: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut state = match ShellState::new(&cli.root) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{} Invalid root: {}", "Error:".red().bold(), e);
            std::process::exit(2);
        }
    };

    if !cli.commands.is_empty() {
        let ok = run_headless(&mut state, &cli).await;
        std::process::exit(if ok { 0 } else { 1 });
    }

    run_repl(&mut state, cli.no_history).await
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run every `-c` line; returns whether all of them succeeded
async fn run_headless(state: &mut ShellState, cli: &Cli) -> bool {
    let options = ExecOptions {
        json: cli.json,
        silent: false,
    };
    let mut all_ok = true;
    for line in &cli.commands {
        let result = state.execute_with(line, options).await;
        if !result.success {
            all_ok = false;
            if !cli.keep_going {
                debug!(%line, "stopping after failed command");
                break;
            }
        }
    }
    all_ok
}

async fn run_repl(state: &mut ShellState, no_history: bool) -> anyhow::Result<()> {
    println!("{}", "=".repeat(60).cyan());
    println!("{}", "  podsh - The Pod Shell".bold().cyan());
    println!("{}", format!("  {}", state.root()).cyan());
    println!("{}", "=".repeat(60).cyan());
    println!();
    println!("Type 'help' for available commands or 'exit' to quit");
    println!();

    // Readline editor with tab completion
    let completer = shell::ShellCompleter::new(state.completion_cache().clone());
    let mut rl: Editor<shell::ShellCompleter, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(completer));

    let history_file = (!no_history)
        .then(dirs::home_dir)
        .flatten()
        .map(|mut p| {
            p.push(".podsh_history");
            p
        });

    if let Some(path) = &history_file {
        let _ = rl.load_history(path);
    }

    loop {
        let prompt = state.prompt();

        match rl.readline(&prompt) {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());

                if matches!(line.trim(), "exit" | "quit") {
                    break;
                }
                // Errors are already reported through the output channel
                state.execute(&line).await;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                println!("exit");
                break;
            }
            Err(err) => {
                eprintln!("{} {:?}", "Error:".red().bold(), err);
                break;
            }
        }
    }

    if let Some(path) = &history_file {
        if let Err(e) = rl.save_history(path) {
            debug!(error = %e, "failed to save history");
        }
    }

    println!("Goodbye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["podsh"]).unwrap();
        assert_eq!(cli.root, "https://pod.example/");
        assert!(cli.commands.is_empty());
        assert!(!cli.json && !cli.keep_going && !cli.no_history);
    }

    #[test]
    fn test_cli_repeated_commands() {
        let cli = Cli::try_parse_from([
            "podsh", "--root", "https://alice.example/", "-c", "mkdir docs", "-c", "ls", "--json",
        ])
        .unwrap();
        assert_eq!(cli.root, "https://alice.example/");
        assert_eq!(cli.commands, vec!["mkdir docs", "ls"]);
        assert!(cli.json);
    }
}
