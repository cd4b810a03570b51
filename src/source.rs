//! The device-side collaborator the acquisition loop polls.

use crate::channel::Channel;
use crate::error::ChannelReadError;

/// A connected device that can report the current raw bytes of a channel.
///
/// Reads take `&self` so the loop can have all four reads of a tick in
/// flight at once. Connection timeouts are the implementation's business.
#[allow(async_fn_in_trait)]
pub trait ChannelSource {
    async fn read_channel(&self, channel: Channel) -> Result<Vec<u8>, ChannelReadError>;

    async fn is_connected(&self) -> bool;
}
