use askql::agent::{ProviderError, SqlAgent};
use askql::backslash_commands::{ReplInput, help_text, parse_input, run_catalog_command};
use askql::cli::Args;
use askql::config::{AgentConfig, get_config_dir};
use askql::format::{format_json, format_response};
use askql::logging;
use askql::prompt::AskPrompt;
use clap::Parser;
use nu_ansi_term::{Color, Style};
use reedline::{DefaultHinter, FileBackedHistory, Reedline, Signal};
use std::error::Error as StdError;
use std::io::IsTerminal;
use std::process::ExitCode;

fn print_response(response: &askql::agent::PipelineResponse, json: bool) {
    if json {
        match format_json(response) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Error serializing response: {e}"),
        }
    } else {
        print!("{}", format_response(response, std::io::stdout().is_terminal()));
    }
}

async fn run_repl(agent: &SqlAgent, json: bool) -> Result<(), Box<dyn StdError>> {
    let hinter =
        Box::new(DefaultHinter::default().with_style(Style::new().italic().fg(Color::LightGray)));

    let history = Box::new(
        match get_config_dir().map(|dir| -> std::io::Result<FileBackedHistory> {
            std::fs::create_dir_all(&dir)?;
            FileBackedHistory::with_file(1000, dir.join("history"))
                .map_err(|e| std::io::Error::other(e.to_string()))
        }) {
            Some(Ok(history)) => history,
            Some(Err(e)) => {
                eprintln!("Warning: Could not create history file: {e}");
                FileBackedHistory::default()
            }
            None => FileBackedHistory::default(),
        },
    );

    let mut line_editor = Reedline::create().with_hinter(hinter).with_history(history);
    let prompt = AskPrompt::new(agent.database_name(), agent.provider_name());

    println!(
        "{}",
        Color::Cyan
            .bold()
            .paint(format!("askql: asking {} via {}", agent.database_name(), agent.provider_name()))
    );
    println!("Type \\h for help");

    loop {
        match line_editor.read_line(&prompt)? {
            Signal::Success(input) => match parse_input(&input) {
                ReplInput::Empty => continue,
                ReplInput::Exit => break,
                ReplInput::Help => println!("{}", help_text()),
                ReplInput::Unknown(cmd) => {
                    eprintln!("Unknown command: {cmd}. Type \\h for help");
                }
                ReplInput::Question(question) => {
                    let response = agent.run(&question).await;
                    print_response(&response, json);
                    println!();
                }
                command => {
                    if let Some(text) = run_catalog_command(&command, agent).await {
                        println!("{text}");
                    }
                }
            },
            Signal::CtrlC => {
                println!("^C");
                continue;
            }
            Signal::CtrlD => {
                println!("\nGoodbye!");
                break;
            }
        }
    }

    Ok(())
}

async fn async_main() -> Result<ExitCode, Box<dyn StdError>> {
    let args = Args::parse();

    let mut config = match AgentConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return Ok(ExitCode::FAILURE);
        }
    };
    args.apply_to(&mut config);
    if let Err(e) = config.validate() {
        eprintln!("{}", e.user_message());
        return Ok(ExitCode::FAILURE);
    }

    let _log_guard = logging::init(&config.logging, &config.log_file_path(), args.verbose)?;
    tracing::debug!("Loaded configuration: {:?}", config);

    let agent = match SqlAgent::new(&config) {
        Ok(agent) => agent,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return Ok(ExitCode::FAILURE);
        }
    };

    // Refuse to start rather than fail on the first question
    if !agent.is_configured() {
        eprintln!("{}", ProviderError::NotConfigured);
        return Ok(ExitCode::FAILURE);
    }

    let code = match &args.question {
        Some(question) => {
            let response = agent.run(question).await;
            print_response(&response, args.json);
            if response.is_error() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        None => {
            run_repl(&agent, args.json).await?;
            ExitCode::SUCCESS
        }
    };

    agent.close().await;
    Ok(code)
}

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(async_main());
    runtime.shutdown_timeout(std::time::Duration::from_secs(2));

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
