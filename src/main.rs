use clap::Parser;
use colored::*;
use std::io::{self, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use voice_chat_client::cli::{parse_command, Args, ReplCommand, REPL_HELP};
use voice_chat_client::config::{app_dir, ClientConfig, UiState, STATE_FILE};
use voice_chat_client::error::ChatError;
use voice_chat_client::navigation::channel_location;
use voice_chat_client::playback::ConfiguredPlayer;
use voice_chat_client::transcript::{ChatTurn, TerminalRenderer, TranscriptRenderer};
use voice_chat_client::{ChatClient, TurnReport};

type Client = ChatClient<TerminalRenderer<io::Stdout>, ConfiguredPlayer>;

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_state() -> (UiState, Option<std::path::PathBuf>) {
    let Some(path) = app_dir().map(|d| d.join(STATE_FILE)) else {
        return (UiState::default(), None);
    };
    match UiState::load_or_create(&path) {
        Ok(state) => (state, Some(path)),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "ui state unavailable; using a temporary session");
            (UiState::default(), None)
        }
    }
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_channels(client: &Client, query: &str) {
    let current = client.navigator().current_channel();
    let matches = client.search_channels(query);
    if matches.is_empty() {
        println!("{}", "no channels".dimmed());
    }
    for channel in matches {
        let marker = if Some(channel.id.as_str()) == current { "*" } else { " " };
        println!("{} {}  {}", marker.bright_green(), channel.display_name(), channel.id.dimmed());
    }
}

fn print_models(client: &Client) {
    if client.models().is_empty() {
        println!("{}", "no models".dimmed());
    }
    for model in client.models() {
        let marker = if Some(model.as_str()) == client.selected_model() { "*" } else { " " };
        println!("{} {}", marker.bright_green(), model);
    }
}

fn print_prompt(client: &Client) {
    let label = client.navigator().current_channel().unwrap_or("new chat");
    print!("{} ", format!("[{}]>", label).bright_blue());
    let _ = io::stdout().flush();
}

/// Report a turn to the one-shot caller; a failed request becomes an error.
fn one_shot_result(report: TurnReport) -> Result<(), Box<dyn std::error::Error>> {
    match report {
        TurnReport::Failed(message) => Err(message.into()),
        _ => Ok(()),
    }
}

fn show_error(client: &mut Client, error: &ChatError) {
    client
        .renderer_mut()
        .append_message(ChatTurn::notice(error.to_string()));
}

// ---------------------------------------------------------------------------
// Interactive loop
// ---------------------------------------------------------------------------

fn input_lines<R: AsyncBufRead>(reader: R) -> LinesStream<R> {
    LinesStream::new(reader.lines())
}

async fn repl(client: &mut Client) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "Type a message, or /help for commands.".dimmed());
    let mut lines = input_lines(BufReader::new(tokio::io::stdin()));

    loop {
        print_prompt(client);
        let Some(line) = lines.next().await.transpose()? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let result = match parse_command(&line) {
            ReplCommand::Send(text) => client.send_text(&text).await.map(|_| ()),
            ReplCommand::New => {
                client.new_chat();
                Ok(())
            }
            ReplCommand::Channels => {
                print_channels(client, "");
                Ok(())
            }
            ReplCommand::Search(query) => {
                print_channels(client, &query);
                Ok(())
            }
            ReplCommand::Open(id) => {
                client.open_channel(&id).await;
                Ok(())
            }
            ReplCommand::Goto(path) => {
                client.open_location(&path).await;
                Ok(())
            }
            ReplCommand::Delete(id) => client.delete_channel(&id).await,
            ReplCommand::DeleteAll => client.delete_all().await,
            ReplCommand::Models => {
                print_models(client);
                Ok(())
            }
            ReplCommand::Model(name) => {
                if !client.select_model(&name) {
                    println!("{} {}", "model not offered by server:".yellow(), name);
                }
                Ok(())
            }
            ReplCommand::Audio(path) => client.send_audio_file(&path).await.map(|_| ()),
            ReplCommand::Record(path) => client.record_wav(&path).await.map(|_| ()),
            ReplCommand::Stop => {
                client.stop_audio();
                Ok(())
            }
            ReplCommand::Help => {
                println!("{}", REPL_HELP);
                Ok(())
            }
            ReplCommand::Quit => break,
            ReplCommand::Invalid(message) => {
                println!("{}", message.yellow());
                Ok(())
            }
        };

        if let Err(e) = result {
            show_error(client, &e);
        }
    }
    client.stop_audio();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }

    let mut config = ClientConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    init_tracing(&config.log_level);

    let (state, state_path) = load_state();
    let player = ConfiguredPlayer::from_config(config.audio_player.as_deref());
    let mut client = ChatClient::new(
        config,
        state,
        state_path,
        TerminalRenderer::new(io::stdout()),
        player,
    )?;

    if let Err(e) = client.bootstrap().await {
        warn!(error = %e, "bootstrap failed");
        eprintln!(
            "{} {}",
            "could not reach server at".bright_red(),
            client.config().server_url
        );
    }

    if let Some(model) = &args.model {
        if !client.select_model(model) {
            eprintln!("{} {}", "model not offered by server:".yellow(), model);
        }
    }
    if let Some(channel) = &args.channel {
        client.open_location(&channel_location(channel)).await;
    }

    if let Some(path) = &args.audio_file {
        return one_shot_result(client.send_audio_file(path).await?);
    }
    if let Some(path) = &args.record_wav {
        return one_shot_result(client.record_wav(path).await?);
    }
    if let Some(prompt) = &args.prompt {
        return one_shot_result(client.send_text(prompt).await?);
    }

    repl(&mut client).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_input_lines_yields_commands_in_order() {
        let input: &[u8] = b"hello\n/open c1\n/quit\n";
        let mut lines = input_lines(input);
        let mut parsed = Vec::new();
        while let Some(line) = lines.next().await {
            parsed.push(parse_command(&line.unwrap()));
        }
        assert_eq!(
            parsed,
            vec![
                ReplCommand::Send("hello".into()),
                ReplCommand::Open("c1".into()),
                ReplCommand::Quit,
            ]
        );
    }
}
