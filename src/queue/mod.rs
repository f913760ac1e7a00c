pub mod ring;
pub mod state;

pub use ring::{Consumer, Producer, RingBuffer};
pub use state::{IndexSnapshot, QueueState};
