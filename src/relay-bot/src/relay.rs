//! Routes Telegram updates to relay turns.
//!
//! Each chat gets one worker task fed by an unbounded queue, so messages
//! from a chat are handled strictly in arrival order while different chats
//! proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{LiveOutputPresenter, RelayError, RetryPolicy, TurnDispatcher};
use relay_telegram::commands::RESET_TEXT;
use relay_telegram::{
    Message, ParsedCommand, TelegramBot, TelegramReplyTransport, Update, UpdateHandler,
    parse_command,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Reply to chats outside the allow-list.
pub const UNAUTHORIZED_TEXT: &str = "You are not authorized to use this bot.";

/// Everything a turn needs, shared by all chat workers.
pub struct RelayContext {
    pub bot: Arc<TelegramBot>,
    pub dispatcher: Arc<TurnDispatcher>,
    pub presenter: LiveOutputPresenter,
    pub retry: RetryPolicy,
    /// Username of the bot, for `/command@botname` filtering.
    pub bot_username: Option<String>,
}

impl RelayContext {
    /// Handle one message from a chat. Never fails; errors are logged and,
    /// for failed turns, reported to the chat.
    pub async fn handle_message(&self, message: Message) {
        let chat_id = message.chat.id;
        let key = chat_id.to_string();

        if !self.bot.config().is_allowed(chat_id) {
            info!(chat_id, "Rejecting message from unauthorized chat");
            self.reply_plain(chat_id, message.message_id, UNAUTHORIZED_TEXT)
                .await;
            return;
        }

        if message.is_command() {
            match parse_command(&message, self.bot_username.as_deref()) {
                Some(command) => self.handle_command(&key, &message, command).await,
                None => debug!(chat_id, "Ignoring command for another bot"),
            }
            return;
        }

        let text = message.text().trim();
        if text.is_empty() {
            debug!(chat_id, "Ignoring message without text");
            return;
        }

        self.relay_turn(&key, chat_id, message.message_id, text)
            .await;
    }

    async fn handle_command(&self, key: &str, message: &Message, command: ParsedCommand) {
        let chat_id = message.chat.id;
        match &command {
            ParsedCommand::Reset => self.dispatcher.reset_conversation(key).await,
            ParsedCommand::Unknown { command, .. } => {
                debug!(chat_id, command = %command, "Ignoring unknown command");
            }
            ParsedCommand::Start | ParsedCommand::Help => {}
        }

        if let Some(text) = command.reply_text()
            && let Err(e) = self
                .bot
                .send_message(chat_id, text, Some(message.message_id))
                .await
        {
            warn!(chat_id, error = %e, "Couldn't answer command");
        }
    }

    async fn relay_turn(&self, key: &str, chat_id: i64, message_id: i64, text: &str) {
        info!(key = %key, chars = text.chars().count(), "Relaying turn");

        let dispatcher = self.dispatcher.as_ref();
        let result: Result<_, RelayError> = async {
            let deltas = self
                .retry
                .run(|| dispatcher.dispatch_turn(key, text))
                .await?;
            let transport = TelegramReplyTransport::new(self.bot.clone(), chat_id, Some(message_id));
            self.presenter.present(&transport, key, deltas).await
        }
        .await;

        match result {
            Ok(Some(handle)) => debug!(key = %key, message_id = handle.id, "Turn complete"),
            Ok(None) => warn!(key = %key, "Backend returned no answer"),
            Err(e) => {
                error!(key = %key, error = %e, "Turn failed");
                let reply = format!("Error: {}", e.user_message());
                self.reply_plain(chat_id, message_id, &reply).await;
            }
        }
    }

    async fn reply_plain(&self, chat_id: i64, reply_to: i64, text: &str) {
        if let Err(e) = self.bot.send_plain(chat_id, text, Some(reply_to)).await {
            warn!(chat_id, error = %e, "Couldn't send reply");
        }
    }
}

/// How long a chat worker waits for its next message before exiting.
pub const DEFAULT_WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

type WorkerMap = Arc<Mutex<HashMap<i64, mpsc::UnboundedSender<Message>>>>;

/// [`UpdateHandler`] that fans updates out to per-chat workers.
///
/// A worker exits after [`DEFAULT_WORKER_IDLE_TIMEOUT`] without messages and
/// the next message for its chat starts a new one.
pub struct RelayBot {
    context: Arc<RelayContext>,
    workers: WorkerMap,
    idle_timeout: Duration,
}

impl RelayBot {
    pub fn new(context: RelayContext) -> Self {
        Self {
            context: Arc::new(context),
            workers: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout: DEFAULT_WORKER_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn context(&self) -> &Arc<RelayContext> {
        &self.context
    }

    /// Queue `message` on its chat's worker, starting one if needed.
    pub fn route(&self, message: Message) {
        let chat_id = message.chat.id;
        let mut workers = self.workers.lock();

        let message = match workers.get(&chat_id) {
            Some(queue) => match queue.send(message) {
                Ok(()) => return,
                // Worker is gone; start a fresh one with the message.
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(run_worker(
            chat_id,
            rx,
            self.context.clone(),
            self.workers.clone(),
            self.idle_timeout,
        ));

        if tx.send(message).is_err() {
            error!(chat_id, "Chat worker exited before receiving work");
        }
        workers.insert(chat_id, tx);
    }

    /// Number of chats with a worker.
    pub fn active_chats(&self) -> usize {
        self.workers.lock().len()
    }
}

async fn run_worker(
    chat_id: i64,
    mut rx: mpsc::UnboundedReceiver<Message>,
    context: Arc<RelayContext>,
    workers: WorkerMap,
    idle_timeout: Duration,
) {
    debug!(chat_id, "Chat worker started");
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(message)) => context.handle_message(message).await,
            Ok(None) => break,
            Err(_) => {
                // Senders only push while holding the map lock, so an empty
                // queue seen under the lock stays empty once the entry is gone.
                let mut workers = workers.lock();
                if rx.is_empty() {
                    workers.remove(&chat_id);
                    break;
                }
            }
        }
    }
    debug!(chat_id, "Chat worker stopped");
}

#[async_trait]
impl UpdateHandler for RelayBot {
    async fn handle_update(&self, update: Update) {
        match update.message {
            Some(message) => self.route(message),
            None => debug!(update_id = update.update_id, "Skipping update without message"),
        }
    }
}
