// Draft engine: catalog, ordering, cursor, validation, ledger and the
// per-session controller tying them together.

pub mod catalog;
pub mod controller;
pub mod cursor;
pub mod ledger;
pub mod order;
pub mod player;
pub mod session;
pub mod validate;

pub use catalog::{Catalog, CatalogError};
pub use controller::{CursorState, DraftController, ScopeChangePreview, SessionEvent};
pub use cursor::DraftCursor;
pub use ledger::{Ledger, LedgerError, LedgerSummary, Sale};
pub use order::{DraftOrder, DraftScope, OrderingPolicy};
pub use player::{Player, PlayerId, Role};
pub use session::{Actor, Participant, ParticipantId, Session};
