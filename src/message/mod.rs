pub mod consensus;

pub use consensus::{Envelope, Message, NewView, Proposal, Timeout, Vote};
