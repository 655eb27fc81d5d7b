// ── Local entity store ──

mod table;

pub use table::{Applied, EntityTable, RevisionClock, Update};
