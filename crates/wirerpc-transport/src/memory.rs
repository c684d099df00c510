use std::sync::Arc;

use tokio::sync::mpsc;

use crate::traits::MessageChannel;

/// Create two connected in-process channels.
///
/// Whatever one side sends, the other receives, in order. Dropping one side
/// ends the other side's inbound stream.
pub fn memory_pair() -> (MessageChannel, MessageChannel) {
    let (to_left, left_inbound) = mpsc::unbounded_channel();
    let (to_right, right_inbound) = mpsc::unbounded_channel();

    let left = MessageChannel::new(Arc::new(to_right), left_inbound);
    let right = MessageChannel::new(Arc::new(to_left), right_inbound);
    (left, right)
}
