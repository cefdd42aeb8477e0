// Bot Layer
// Routes Telegram updates through guards to command, payment and document handlers

pub mod commands;
pub mod guard;
pub mod session;
pub mod telegram;

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::AnalysisSession;
use crate::services::access_ledger::{AccessLedger, LedgerError};
use crate::services::config_store::AppConfig;
use crate::services::detection::{check_plagiarism, detect_ai_suspicion, Corpus};
use crate::services::extractor::extract_text;
use crate::services::grammar::GrammarReviewer;
use crate::services::payment::{parse_stk_callback, CallbackOutcome, PaymentGateway, PendingPayments};
use crate::services::report::render_reports;

use commands::{parse_grant_args, parse_revoke_args, CommandKind, CommandLine, ParsedText};
use guard::{guard, Gate, GuardDecision};
use session::{is_valid_phone, PaymentStep, SessionStore};
use telegram::{Document, Message, TelegramError, Transport, Update};

pub use guard::{ADMIN_ONLY_MESSAGE, NO_ACCESS_MESSAGE};

const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

fn start_message() -> &'static str {
    "👋 Welcome to SageBot!\n\
     Send a document (.txt/.docx/.pdf) for AI analysis and plagiarism check.\n\
     Use /pay to purchase access."
}

fn help_message(days: u32) -> String {
    format!(
        "/start - Intro\n\
         /help - This message\n\
         /pay - Pay for {}-day access\n\
         /cancel - Cancel a pending payment form\n\
         /report - Get analysis report",
        days
    )
}

/// Keep only the final path component of a client-supplied name.
fn download_name(document: &Document) -> String {
    document
        .file_name
        .as_deref()
        .and_then(|n| Path::new(n).file_name())
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// One user's message, with the chat to reply to.
struct Incoming<'a> {
    chat_id: i64,
    user_id: i64,
    message: &'a Message,
}

pub struct Dispatcher<T: Transport, G: PaymentGateway> {
    transport: T,
    gateway: G,
    config: AppConfig,
    ledger: AccessLedger,
    sessions: SessionStore,
    grammar: GrammarReviewer,
    pending: PendingPayments,
}

impl<T: Transport, G: PaymentGateway> Dispatcher<T, G> {
    pub fn new(transport: T, gateway: G, config: AppConfig, ledger: AccessLedger, grammar: GrammarReviewer) -> Self {
        Self {
            transport,
            gateway,
            config,
            ledger,
            sessions: SessionStore::new(),
            grammar,
            pending: PendingPayments::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn ledger(&self) -> &AccessLedger {
        &self.ledger
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn pending_payments(&self) -> &PendingPayments {
        &self.pending
    }

    /// Long-poll until Ctrl-C, handling updates strictly in order.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut offset = 0;
        info!("bot.polling_started");

        loop {
            let batch = tokio::select! {
                batch = self.transport.get_updates(offset, POLL_TIMEOUT_SECS) => batch,
                _ = tokio::signal::ctrl_c() => {
                    info!("bot.shutdown_requested");
                    return Ok(());
                }
            };

            match batch {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let update_id = update.update_id;
                        if let Err(e) = self.handle_update(update).await {
                            warn!(update_id, error = %e, "bot.update_failed");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "bot.poll_failed");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }

            self.expire_pending_payments(chrono::Utc::now().timestamp());
            self.drain_callback_inbox().await;
        }
    }

    fn expire_pending_payments(&mut self, now: i64) -> usize {
        let ttl_secs = i64::from(self.config.payment.pending_ttl_minutes) * 60;
        let dropped = self.pending.prune_expired(now, ttl_secs);
        if dropped > 0 {
            info!(dropped, remaining = self.pending.len(), "payment.pending_pruned");
        }
        dropped
    }

    /// Apply every `*.json` callback body in the inbox directory in name order.
    /// Each file is removed before it is applied; unparseable ones are
    /// renamed to `*.rejected`.
    pub async fn drain_callback_inbox(&mut self) -> usize {
        let dir = self.config.paths.callback_inbox_dir.clone();
        let Ok(read_dir) = fs::read_dir(&dir) else {
            return 0;
        };
        let mut paths: Vec<PathBuf> = read_dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
            .collect();
        paths.sort();

        let mut processed = 0;
        for path in paths {
            let payload = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|content| serde_json::from_str::<Value>(&content).map_err(|e| e.to_string()));

            let payload = match payload {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "payment.inbox_rejected");
                    let _ = fs::rename(&path, path.with_extension("rejected"));
                    continue;
                }
            };
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "payment.inbox_remove_failed");
                continue;
            }

            match self.apply_payment_callback(&payload).await {
                Ok(Some(_)) => processed += 1,
                Ok(None) => {}
                Err(e) => error!(path = %path.display(), error = %e, "payment.callback_grant_failed"),
            }
        }
        processed
    }

    pub async fn handle_update(&mut self, update: Update) -> Result<(), TelegramError> {
        let Some(message) = update.message else {
            debug!(update_id = update.update_id, "bot.update_ignored");
            return Ok(());
        };
        let Some(user_id) = message.from.as_ref().map(|u| u.id) else {
            return Ok(());
        };
        let incoming = Incoming {
            chat_id: message.chat.id,
            user_id,
            message: &message,
        };

        if let Some(document) = &message.document {
            if self.admit(&incoming, Gate::Subscriber).await? {
                self.handle_document(&incoming, document).await?;
            }
            return Ok(());
        }

        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };

        match commands::parse_text(text) {
            ParsedText::Command(line) => {
                if self.admit(&incoming, line.kind.gate()).await? {
                    self.handle_command(&incoming, line).await?;
                }
            }
            ParsedText::Unknown(name) => {
                debug!(user_id, command = name, "bot.unknown_command");
                self.reply(&incoming, "Unknown command. Use /help to see what I can do.").await?;
            }
            ParsedText::Plain(body) => {
                if self.sessions.payment_step(user_id) == PaymentStep::AwaitingPhone {
                    self.handle_phone(&incoming, body).await?;
                } else {
                    debug!(user_id, "bot.plain_text_ignored");
                }
            }
        }
        Ok(())
    }

    async fn reply(&self, incoming: &Incoming<'_>, text: &str) -> Result<(), TelegramError> {
        self.transport.send_message(incoming.chat_id, text).await
    }

    /// Run the guard; on denial send its single message.
    async fn admit(&self, incoming: &Incoming<'_>, gate: Gate) -> Result<bool, TelegramError> {
        match guard(gate, incoming.user_id, &self.ledger) {
            GuardDecision::Pass => Ok(true),
            GuardDecision::Deny(message) => {
                info!(user_id = incoming.user_id, gate = ?gate, "bot.access_denied");
                self.reply(incoming, message).await?;
                Ok(false)
            }
        }
    }

    async fn handle_command(&mut self, incoming: &Incoming<'_>, line: CommandLine<'_>) -> Result<(), TelegramError> {
        debug!(user_id = incoming.user_id, command = ?line.kind, "bot.command");
        match line.kind {
            CommandKind::Start => self.reply(incoming, start_message()).await,
            CommandKind::Help => {
                let text = help_message(self.config.payment.access_days);
                self.reply(incoming, &text).await
            }
            CommandKind::Report => self.handle_report(incoming).await,
            CommandKind::Pay => self.handle_pay(incoming).await,
            CommandKind::Cancel => self.handle_cancel(incoming).await,
            CommandKind::Grant => self.handle_grant(incoming, &line.args).await,
            CommandKind::Revoke => self.handle_revoke(incoming, &line.args).await,
            CommandKind::Users => self.handle_users(incoming).await,
        }
    }

    // ============ Payment form ============

    async fn handle_pay(&mut self, incoming: &Incoming<'_>) -> Result<(), TelegramError> {
        if self.ledger.has_access(incoming.user_id) {
            self.sessions.set_payment_step(incoming.user_id, PaymentStep::Idle);
            return self.reply(incoming, "✅ You already have active access.").await;
        }

        self.sessions.set_payment_step(incoming.user_id, PaymentStep::AwaitingPhone);
        let prompt = format!(
            "💳 Enter phone number 2547XXXXXXXX to pay for {}-day access:",
            self.config.payment.access_days
        );
        self.reply(incoming, &prompt).await
    }

    async fn handle_cancel(&mut self, incoming: &Incoming<'_>) -> Result<(), TelegramError> {
        let was_waiting = self.sessions.payment_step(incoming.user_id) == PaymentStep::AwaitingPhone;
        self.sessions.set_payment_step(incoming.user_id, PaymentStep::Idle);
        if was_waiting {
            self.reply(incoming, "Payment cancelled.").await
        } else {
            self.reply(incoming, "Nothing to cancel.").await
        }
    }

    async fn handle_phone(&mut self, incoming: &Incoming<'_>, phone: &str) -> Result<(), TelegramError> {
        if !is_valid_phone(phone) {
            return self.reply(incoming, "⚠️ Invalid format. Use 2547XXXXXXXX.").await;
        }

        let amount = self.config.payment.amount;
        let reply = match self.gateway.request_payment(phone, amount).await {
            Ok(ack) => {
                self.pending.record(&ack, incoming.user_id, phone);
                info!(
                    user_id = incoming.user_id,
                    checkout_request_id = %ack.checkout_request_id,
                    amount,
                    "payment.requested"
                );
                format!("✅ Payment request sent to {}. Complete payment on your phone.", phone)
            }
            Err(e) => {
                warn!(user_id = incoming.user_id, error = %e, "payment.request_failed");
                format!("❌ Payment failed: {}", e)
            }
        };
        self.sessions.set_payment_step(incoming.user_id, PaymentStep::Done);
        self.reply(incoming, &reply).await
    }

    /// Resolve a Daraja STK callback body against the pending payments and
    /// tell the payer the outcome.
    pub async fn apply_payment_callback(&mut self, payload: &Value) -> Result<Option<CallbackOutcome>, LedgerError> {
        let Some(callback) = parse_stk_callback(payload) else {
            warn!("payment.callback_malformed");
            return Ok(None);
        };

        let days = self.config.payment.access_days;
        let outcome = self.pending.confirm(&callback, &mut self.ledger, days)?;

        let notice = match &outcome {
            CallbackOutcome::Granted { user_id, .. } => {
                Some((*user_id, format!("✅ Payment received. You now have {} days of access.", days)))
            }
            CallbackOutcome::Failed { user_id, reason } => Some((*user_id, format!("❌ Payment failed: {}", reason))),
            CallbackOutcome::Unmatched { .. } => None,
        };
        if let Some((user_id, text)) = notice {
            // Private chats share the user's id
            if let Err(e) = self.transport.send_message(user_id, &text).await {
                warn!(user_id, error = %e, "payment.notify_failed");
            }
        }
        Ok(Some(outcome))
    }

    // ============ Admin ============

    async fn handle_grant(&mut self, incoming: &Incoming<'_>, args: &[&str]) -> Result<(), TelegramError> {
        let (user_id, days) = match parse_grant_args(args) {
            Ok(parsed) => parsed,
            Err(e) => return self.reply(incoming, e.message()).await,
        };

        match self.ledger.grant(user_id, days) {
            Ok(_) => {
                let text = format!("✅ Granted {} days to {}.", days, user_id);
                self.reply(incoming, &text).await
            }
            Err(e) => {
                error!(user_id, error = %e, "ledger.grant_failed");
                self.reply(incoming, &format!("⚠️ Could not save access ledger: {}", e)).await
            }
        }
    }

    async fn handle_revoke(&mut self, incoming: &Incoming<'_>, args: &[&str]) -> Result<(), TelegramError> {
        let user_id = match parse_revoke_args(args) {
            Ok(id) => id,
            Err(e) => return self.reply(incoming, e.message()).await,
        };

        match self.ledger.revoke(user_id) {
            Ok(_) => {
                let text = format!("✅ Revoked access for {}.", user_id);
                self.reply(incoming, &text).await
            }
            Err(e) => {
                error!(user_id, error = %e, "ledger.revoke_failed");
                self.reply(incoming, &format!("⚠️ Could not save access ledger: {}", e)).await
            }
        }
    }

    async fn handle_users(&self, incoming: &Incoming<'_>) -> Result<(), TelegramError> {
        let lines: Vec<String> = self
            .ledger
            .active_entries()
            .iter()
            .map(|e| format!("{} - expires in {} days", e.user_id, e.days_remaining))
            .collect();

        if lines.is_empty() {
            self.reply(incoming, "No paid users.").await
        } else {
            self.reply(incoming, &lines.join("\n")).await
        }
    }

    // ============ Documents ============

    async fn handle_document(&mut self, incoming: &Incoming<'_>, document: &Document) -> Result<(), TelegramError> {
        let start = Instant::now();
        let file_name = download_name(document);
        let downloads_dir = self.config.paths.downloads_dir.clone();
        let dest: PathBuf = downloads_dir.join(format!("{}_{}", chrono::Utc::now().timestamp(), file_name));

        if let Err(e) = fs::create_dir_all(&downloads_dir) {
            error!(dir = %downloads_dir.display(), error = %e, "document.download_dir_failed");
            return self.reply(incoming, "⚠️ Could not store the file. Try again later.").await;
        }
        if let Err(e) = self.transport.download_file(&document.file_id, &dest).await {
            warn!(user_id = incoming.user_id, error = %e, "document.download_failed");
            return self.reply(incoming, "⚠️ Could not download the file. Try again.").await;
        }

        let text = match extract_text(&dest) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %dest.display(), error = %e, "document.extract_failed");
                return self.reply(incoming, &format!("⚠️ Error reading file: {}", e)).await;
            }
        };
        if text.trim().is_empty() {
            warn!(path = %dest.display(), "document.empty_text");
            return self.reply(incoming, "⚠️ Empty text").await;
        }

        let ai = detect_ai_suspicion(&text);
        let corpus = Corpus::load_or_empty(&self.config.paths.corpus_file);
        let plagiarism = check_plagiarism(&text, &corpus, self.config.detection.plagiarism_top_n);
        let grammar = self.grammar.review(&text).await;

        let session = AnalysisSession {
            id: Uuid::new_v4(),
            file_name: file_name.clone(),
            raw_text_path: dest,
            ai,
            plagiarism,
            grammar,
            timestamp: chrono::Utc::now().timestamp(),
        };

        let summary = format!(
            "✅ Received your document: {}\n\
             🧠 AI suspicion: {}%\n\
             📚 Plagiarism top match: {}%\n\
             ✍️ Grammar issues: {}\n\
             Use /report to get a detailed report.",
            file_name,
            session.ai.percent,
            session.plagiarism.percent,
            session.grammar.issue_count()
        );

        info!(
            user_id = incoming.user_id,
            session_id = %session.id,
            message_id = incoming.message.message_id,
            ai_percent = session.ai.percent,
            plagiarism_percent = session.plagiarism.percent,
            chars = text.chars().count(),
            latency_ms = start.elapsed().as_millis() as i64,
            "document.analyzed"
        );
        self.sessions.store_analysis(incoming.user_id, session);
        self.reply(incoming, &summary).await
    }

    async fn handle_report(&self, incoming: &Incoming<'_>) -> Result<(), TelegramError> {
        let Some(session) = self.sessions.analysis(incoming.user_id) else {
            return self.reply(incoming, "⚠️ No analysis found. Upload a document first.").await;
        };

        let paths = match render_reports(session, &self.config.paths.reports_dir, &self.config.report.highlights) {
            Ok(paths) => paths,
            Err(e) => {
                error!(session_id = %session.id, error = %e, "report.render_failed");
                return self.reply(incoming, &format!("⚠️ Could not generate report: {}", e)).await;
            }
        };

        self.reply(incoming, "📄 Your detailed reports are ready:").await?;
        self.transport.send_document(incoming.chat_id, &paths.pdf).await?;
        self.transport.send_document(incoming.chat_id, &paths.docx).await
    }
}
