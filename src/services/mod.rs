// SageBot Core Services
// Scoring pipeline, document I/O and the external collaborators the bot talks to

pub mod text_processor;
pub mod extractor;
pub mod fuzzy;
pub mod detection;
pub mod grammar;
pub mod config_store;
pub mod access_ledger;
pub mod payment;
pub mod report;

pub use text_processor::*;
pub use config_store::*;
pub use extractor::{extract_text, DocumentKind, ExtractError};
pub use access_ledger::{AccessLedger, ActiveEntry, Clock, LedgerError, SystemClock};
pub use grammar::{GrammarReviewer, LanguageToolClient};
pub use payment::{MpesaClient, PaymentError, PaymentGateway, PendingPayments, StkPushAck};
pub use report::{render_reports, ReportError, ReportPaths};

// Re-export detection module functions
pub use detection::{
    aggregate_components,
    check_plagiarism,
    compute_components,
    detect_ai_suspicion,
    Corpus,
    DEFAULT_TOP_N,
};
