//! chatbot – terminal front end.
//!
//! Chats live in a directory-backed store (one JSON file per key) under the
//! platform data directory, capped at a byte quota so the storage degradation
//! ladder behaves the same as it does in a browser.

mod print;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chatbot_client::{ApiClient, Attachment, ChatController};
use chatbot_core::FileStore;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;

/// Browser `localStorage` is typically limited to about 5 MiB per origin.
const DEFAULT_QUOTA: usize = 5 * 1024 * 1024;

#[derive(Debug, Parser)]
#[command(name = "chatbot", version, about = "Chat with the multimodal assistant")]
struct Cli {
    /// Backend base URL.
    #[arg(long, env = "CHATBOT_SERVER_URL", default_value = "http://localhost:5000", global = true)]
    server: String,

    /// Where chats and the session are kept.
    #[arg(long, env = "CHATBOT_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Local storage budget in bytes.
    #[arg(long, env = "CHATBOT_STORAGE_QUOTA", default_value_t = DEFAULT_QUOTA, global = true)]
    quota: usize,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the backend is up.
    Health,
    /// Create an account and sign in.
    Register {
        name: String,
        email: String,
        #[arg(long, env = "CHATBOT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in to an existing account.
    Login {
        email: String,
        #[arg(long, env = "CHATBOT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Start a new chat and make it current.
    New { name: Option<String> },
    /// List chats, most recently modified first.
    List,
    /// Print a chat transcript (the current chat by default).
    Show { id: Option<i64> },
    /// Send a message to the current chat.
    Send {
        /// Message text; may be empty when a file is attached.
        text: Vec<String>,
        /// Image or audio file to attach.
        #[arg(long, short)]
        file: Option<PathBuf>,
        /// Send to this chat instead of the current one.
        #[arg(long)]
        chat: Option<i64>,
    },
    /// Rename a chat.
    Rename { id: i64, name: String },
    /// Delete a chat.
    Delete { id: i64 },
    /// Delete every local chat.
    Clear,
    /// Toggle between light and dark theme.
    Theme,
    /// Copy chats stored on the server into the local list.
    Pull,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let store = FileStore::open(&data_dir)
        .with_context(|| format!("cannot open data directory {}", data_dir.display()))?
        .with_quota(cli.quota);
    debug!(data_dir = %data_dir.display(), quota = cli.quota, "local store ready");

    let api = ApiClient::new(&cli.server)?;
    let mut ctl = ChatController::new(api, Arc::new(store));
    restore_current(&mut ctl);

    match cli.command {
        Command::Health => {
            let health = ctl.api().health().await?;
            println!("{} ({})", health.status, health.provider);
        }
        Command::Register { name, email, password } => {
            let user = ctl.register(&name, &email, &password).await?;
            println!("Signed in as {} <{}>", user.name, user.email);
        }
        Command::Login { email, password } => {
            let user = ctl.login(&email, &password).await?;
            println!("Signed in as {} <{}>", user.name, user.email);
        }
        Command::Logout => {
            ctl.logout();
            println!("Signed out");
        }
        Command::Whoami => match ctl.user() {
            Some(user) => println!("{} <{}>", user.name, user.email),
            None => println!("Not signed in"),
        },
        Command::New { name } => {
            let chat = ctl.new_chat(name.as_deref());
            println!("{}", print::chat_line(chat, true));
        }
        Command::List => {
            let current = ctl.current().map(|c| c.id);
            let chats = ctl.chats();
            if chats.is_empty() {
                println!("No chats yet");
            }
            for chat in &chats {
                println!("{}", print::chat_line(chat, Some(chat.id) == current));
            }
        }
        Command::Show { id } => {
            if let Some(id) = id {
                ctl.select(id);
            }
            match ctl.current() {
                Some(chat) => print!("{}", print::transcript(chat)),
                None => bail!("no such chat"),
            }
        }
        Command::Send { text, file, chat } => {
            if let Some(id) = chat
                && ctl.select(id).is_none()
            {
                bail!("chat {id} not found");
            }
            let attachment = match file {
                Some(path) => Some(read_attachment(&path).await?),
                None => None,
            };
            match ctl.send(&text.join(" "), attachment).await {
                Some(reply) => println!("{}", reply.content),
                None => bail!("nothing to send: provide text or --file"),
            }
        }
        Command::Rename { id, name } => {
            if !ctl.rename(id, &name) {
                bail!("chat {id} not found");
            }
        }
        Command::Delete { id } => {
            if !ctl.delete_chat(id) {
                bail!("chat {id} not found");
            }
        }
        Command::Clear => {
            ctl.clear_chats();
            println!("All chats deleted");
        }
        Command::Theme => {
            let dark = ctl.toggle_dark_mode();
            println!("{}", if dark { "dark" } else { "light" });
        }
        Command::Pull => {
            let added = ctl.pull_remote().await?;
            println!("{added} chat(s) added");
        }
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn default_data_dir() -> PathBuf {
    dirs_next::data_dir()
        .map(|dir| dir.join("chatbot"))
        .unwrap_or_else(|| PathBuf::from(".chatbot"))
}

/// The remembered chat is handed out once per start; re-select it (or the
/// most recent chat) so it stays current for the next invocation.
fn restore_current<S>(ctl: &mut ChatController<S>)
where
    S: chatbot_core::KeyValueStore + Clone,
{
    let id = ctl
        .current()
        .map(|c| c.id)
        .or_else(|| ctl.chats().first().map(|c| c.id));
    if let Some(id) = id {
        ctl.select(id);
    }
}

async fn read_attachment(path: &Path) -> anyhow::Result<Attachment> {
    let Some(mime_type) = guess_mime(path) else {
        bail!("{}: only image or audio files can be attached", path.display());
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_owned());
    Ok(Attachment::new(file_name, mime_type, bytes))
}

fn guess_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "webm" => "audio/webm",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        _ => return None,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn send_collects_words_and_file() {
        let cli = Cli::try_parse_from(["chatbot", "send", "what", "is", "this", "-f", "cat.PNG"]).unwrap();
        match cli.command {
            Command::Send { text, file, chat } => {
                assert_eq!(text.join(" "), "what is this");
                assert_eq!(file.as_deref(), Some(Path::new("cat.PNG")));
                assert!(chat.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn mime_is_guessed_from_extension() {
        assert_eq!(guess_mime(Path::new("cat.PNG")), Some("image/png"));
        assert_eq!(guess_mime(Path::new("memo.webm")), Some("audio/webm"));
        assert_eq!(guess_mime(Path::new("report.pdf")), None);
        assert_eq!(guess_mime(Path::new("noext")), None);
    }
}
