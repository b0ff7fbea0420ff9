//! Triage Dispatch: the three parallel action branches.
//!
//! Each branch reads its query slot, talks to exactly one class of
//! downstream collaborator, and records a tagged [`Outcome`] in its own
//! state slot. Branches never return stage errors: a failed action is a
//! result to report, not a reason to sink the run or its siblings.
//!
//! [`Outcome`]: triage_core::outcome::Outcome

mod answer;
mod report;
mod ticket;

pub use answer::AnswerActionStage;
pub use report::ReportActionStage;
pub use ticket::TicketActionStage;
