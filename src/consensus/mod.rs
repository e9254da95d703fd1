pub mod pacemaker;
pub mod replica;
pub mod safety;
pub mod votes;

pub use pacemaker::{AdaptivePacemaker, BaselinePacemaker, LeaderSchedule, Pacemaker};
pub use replica::{Actions, Destination, Replica, ReplicaSnapshot, TimerOp};
pub use safety::SafetyRules;
pub use votes::VoteCollector;
