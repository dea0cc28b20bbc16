//! Packet shape, routing table, decision function, ack tracking, and the
//! `Router` engine that ties them together (spec §4.5, §4.9).

pub mod acks;
pub mod decision;
pub mod engine;
pub mod packet;
pub mod table;

pub use acks::{AckState, PendingAckTable, TickOutcome};
pub use decision::{decide, Decision};
pub use engine::{Router, RouterOutcome};
pub use packet::{MessageEnvelope, MessageType, PacketType, RoutablePacket};
pub use table::{RoutingEntry, RoutingTable};
