use log::{info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use marketplace_chat::api::models::{CurrentUser, Role, ThreadEntry};
use marketplace_chat::api::{ApiClient, Session};
use marketplace_chat::app::AppConfig;
use marketplace_chat::storage::ConversationCache;
use marketplace_chat::sync::{ConversationSync, MessageSync, Phase, RoleFilter};
use marketplace_chat::utils::{normalize_url, RUNTIME};

type Input = Lines<BufReader<Stdin>>;

enum Command {
    Login(String),
    WhoAmI,
    List,
    Search(String),
    Role(String),
    New,
    Start(String),
    Open(String),
    Close,
    Help,
    Quit,
    Send(String),
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(Command::Send(line.to_string()));
        }
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim().to_string();
        Some(match cmd {
            "/login" => Command::Login(arg),
            "/whoami" => Command::WhoAmI,
            "/list" => Command::List,
            "/search" => Command::Search(arg),
            "/role" => Command::Role(arg),
            "/new" => Command::New,
            "/start" => Command::Start(arg),
            "/open" => Command::Open(arg),
            "/close" => Command::Close,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        })
    }
}

const HELP: &str = "\
/list                 show conversations (current search and role filter)
/search <text>        filter by name or last message
/role all|brand|influencer
/new                  list people you can start a conversation with
/start <user id>      start (or reopen) a conversation
/open <id>            open a conversation
/close                leave the open conversation
/login <token>        replace the session token
/whoami               show the configured account
/quit
anything else is sent to the open conversation";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let config = AppConfig::load();
    if let Err(e) = RUNTIME.block_on(run(config)) {
        eprintln!("marketplace-chat: {e}");
        std::process::exit(1);
    }
}

async fn prompt(input: &mut Input, label: &str) -> Result<String, Box<dyn Error>> {
    println!("{label}");
    Ok(input.next_line().await?.unwrap_or_default().trim().to_string())
}

async fn setup(input: &mut Input, config: &mut AppConfig) -> Result<(), Box<dyn Error>> {
    println!("No account configured yet.");
    config.base_url = normalize_url(&prompt(input, "Server URL (e.g. https://market.example):").await?);
    let id = prompt(input, "Your user id:").await?;
    let name = prompt(input, "Display name:").await?;
    let role = Role::from(prompt(input, "Role (brand, influencer, ugc_creator):").await?);
    let token = prompt(input, "Session token:").await?;
    if config.base_url.is_empty() || id.is_empty() {
        return Err("server URL and user id are required".into());
    }
    config.user = Some(CurrentUser { id, name, role });
    config.token = Some(token).filter(|t| !t.is_empty());
    config.save()?;
    Ok(())
}

/// Drops the stored token and the cached conversation list after a 401.
fn forget_session() {
    let mut stored = AppConfig::load();
    stored.token = None;
    if let Err(e) = stored.save() {
        warn!("could not clear stored token: {e}");
    }
    match ConversationCache::open_default() {
        Ok(cache) => {
            if let Err(e) = cache.clear() {
                warn!("could not clear cached conversations: {e}");
            }
        }
        Err(e) => warn!("conversation cache unavailable, nothing cleared: {e}"),
    }
}

fn render_entry(entry: &ThreadEntry, me: &str) -> String {
    let who = if entry.sender_id() == me { "you" } else { entry.sender_name() };
    let mark = match entry {
        ThreadEntry::Pending(_) => " (sending)",
        ThreadEntry::Confirmed(m) if m.is_filtered => " (filtered)",
        ThreadEntry::Confirmed(_) => "",
    };
    format!(
        "[{}] {}: {}{}",
        entry.timestamp().format("%H:%M"),
        who,
        entry.text(),
        mark
    )
}

async fn run(mut config: AppConfig) -> Result<(), Box<dyn Error>> {
    let mut input: Input = BufReader::new(tokio::io::stdin()).lines();
    if !config.is_configured() {
        setup(&mut input, &mut config).await?;
    }
    let me = config.user.clone().ok_or("no user configured")?;

    let session = Session::new(config.token.clone()).on_unauthorized(|| {
        eprintln!("Session expired. Use /login <token> to sign in again.");
        tokio::task::spawn_blocking(forget_session);
    });
    let api = Arc::new(ApiClient::new(&config.base_url, session.clone(), config.request_timeout())?);

    let mut conversations = ConversationSync::new(api.clone(), me.clone());
    let cache = ConversationCache::open_default()
        .map_err(|e| warn!("conversation cache unavailable: {e}"))
        .ok();
    if let Some(cache) = &cache {
        match cache.list(Some(200)) {
            Ok(cached) => conversations.seed(cached),
            Err(e) => warn!("could not read cached conversations: {e}"),
        }
    }
    conversations.start(config.conversation_poll());

    let thread = Arc::new(
        MessageSync::new(api.clone(), me.clone())
            .poll_every(config.message_poll())
            .filtered_notice_for(config.filtered_notice()),
    );

    {
        let mut rx = conversations.subscribe();
        let cache = cache.map(|c| Arc::new(Mutex::new(c)));
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let view = rx.borrow_and_update().clone();
                match view.phase {
                    Phase::Ready => {
                        if let Some(cache) = &cache {
                            let cache = cache.clone();
                            let list = view.conversations.clone();
                            let stored = tokio::task::spawn_blocking(move || {
                                cache.lock().unwrap_or_else(PoisonError::into_inner).upsert(&list)
                            })
                            .await;
                            match stored {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => warn!("could not cache conversations: {e}"),
                                Err(e) => warn!("cache task failed: {e}"),
                            }
                        }
                    }
                    Phase::Error => {
                        if let Some(err) = &view.error {
                            eprintln!("! conversations: {err}");
                        }
                    }
                    _ => {}
                }
            }
        });
    }

    {
        let mut rx = thread.subscribe();
        let me_id = me.id.clone();
        tokio::spawn(async move {
            let mut shown: HashSet<String> = HashSet::new();
            let mut current: Option<String> = None;
            let mut last_error: Option<String> = None;
            let mut notice = false;
            let mut last_draft = String::new();
            while rx.changed().await.is_ok() {
                let view = rx.borrow_and_update().clone();
                if view.conversation_id != current {
                    shown.clear();
                    current = view.conversation_id.clone();
                }
                for entry in view.entries.iter() {
                    if shown.insert(entry.id().to_string()) {
                        println!("{}", render_entry(entry, &me_id));
                    }
                }
                if view.error != last_error {
                    if let Some(err) = &view.error {
                        eprintln!("! {err}");
                    }
                    last_error = view.error.clone();
                }
                if view.filtered_notice && !notice {
                    println!("* Contact details were removed from your message.");
                }
                notice = view.filtered_notice;
                if view.draft != last_draft {
                    if !view.draft.is_empty() {
                        println!("* Not sent, draft kept: {}", view.draft);
                    }
                    last_draft = view.draft.clone();
                }
            }
        });
    }

    let mut query = String::new();
    let mut role = RoleFilter::All;
    println!("Signed in as {} ({}). Type /help for commands.", me.name, me.role);

    while let Some(line) = input.next_line().await? {
        let Some(command) = Command::parse(&line) else {
            continue;
        };
        match command {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::WhoAmI => println!(
                "{} ({}, id {}) on {}{}",
                me.name,
                me.role,
                me.id,
                config.base_url,
                if session.is_authenticated() { "" } else { " [signed out]" }
            ),
            Command::Login(token) => {
                if token.is_empty() {
                    println!("usage: /login <token>");
                    continue;
                }
                session.set_token(token.clone());
                config.token = Some(token);
                config.save()?;
                info!("session token replaced");
                conversations.refresh().await;
                thread.refresh().await;
            }
            Command::List => {
                let view = conversations.snapshot();
                if view.phase == Phase::Loading {
                    println!("(loading)");
                }
                for c in conversations.filtered(&query, role) {
                    let other = c.other_participant(&me.id);
                    println!(
                        "{}  {} [{}]  {}",
                        c.id,
                        other.map(|d| d.name.as_str()).unwrap_or("?"),
                        other.map(|d| d.role.to_string()).unwrap_or_default(),
                        c.last_message.as_deref().unwrap_or("")
                    );
                }
            }
            Command::Search(text) => {
                query = text;
                println!("search: '{query}'");
            }
            Command::Role(arg) => match arg.parse::<RoleFilter>() {
                Ok(r) => {
                    role = r;
                    println!("role filter: {role}");
                }
                Err(e) => println!("{e}"),
            },
            Command::New => match conversations.candidates().await {
                Ok(users) if users.is_empty() => println!("nobody new to talk to"),
                Ok(users) => {
                    for u in users {
                        println!("{}  {} [{}]", u.id, u.name, u.role);
                    }
                }
                Err(e) => eprintln!("! {e}"),
            },
            Command::Start(user_id) => match conversations.start_conversation(&user_id).await {
                Ok(id) => {
                    println!("opened conversation {id}");
                    thread.open(id);
                }
                Err(e) => eprintln!("! {e}"),
            },
            Command::Open(id) => {
                if id.is_empty() {
                    println!("usage: /open <conversation id>");
                } else {
                    thread.open(id);
                }
            }
            Command::Close => thread.close(),
            Command::Send(text) => {
                if thread.conversation_id().is_none() {
                    println!("open a conversation first (/list, /open <id>)");
                    continue;
                }
                let thread = thread.clone();
                tokio::spawn(async move {
                    let _ = thread.send(&text).await;
                });
            }
            Command::Unknown(cmd) => println!("unknown command {cmd}, try /help"),
        }
    }

    conversations.stop();
    thread.close();
    Ok(())
}
