//! Logical channel identities and their GATT characteristic addresses.

use std::fmt;

use uuid::Uuid;

pub const CHARACTERISTIC_DATA_A: Uuid = Uuid::from_u128(0x31410000_0011_2358_c000_0000beef1001);
pub const CHARACTERISTIC_DATA_B: Uuid = Uuid::from_u128(0x31410000_0011_2358_c000_0000beef0001);
pub const CHARACTERISTIC_DATA_C: Uuid = Uuid::from_u128(0x31410000_0011_2358_c000_0000beef0002);
pub const CHARACTERISTIC_DATA_D: Uuid = Uuid::from_u128(0x31410000_0011_2358_c000_0000beef0003);

/// One of the four data streams polled every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    A,
    B,
    C,
    D,
}

impl Channel {
    /// All channels in column order.
    pub const ALL: [Channel; 4] = [Channel::A, Channel::B, Channel::C, Channel::D];

    pub fn index(self) -> usize {
        match self {
            Channel::A => 0,
            Channel::B => 1,
            Channel::C => 2,
            Channel::D => 3,
        }
    }

    /// Column label used in the output file header.
    pub fn label(self) -> &'static str {
        match self {
            Channel::A => "Data A",
            Channel::B => "Data B",
            Channel::C => "Data C",
            Channel::D => "Data D",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::A => "A",
            Channel::B => "B",
            Channel::C => "C",
            Channel::D => "D",
        };
        f.write_str(name)
    }
}

/// Fixed mapping from channel to the characteristic that serves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    uuids: [Uuid; 4],
}

impl ChannelMap {
    pub fn new(a: Uuid, b: Uuid, c: Uuid, d: Uuid) -> Self {
        Self { uuids: [a, b, c, d] }
    }

    pub fn uuid(&self, channel: Channel) -> Uuid {
        self.uuids[channel.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, Uuid)> + '_ {
        Channel::ALL.into_iter().map(|channel| (channel, self.uuid(channel)))
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self::new(
            CHARACTERISTIC_DATA_A,
            CHARACTERISTIC_DATA_B,
            CHARACTERISTIC_DATA_C,
            CHARACTERISTIC_DATA_D,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_map_matches_device_characteristics() {
        let map = ChannelMap::default();
        assert_eq!(
            map.uuid(Channel::A).to_string(),
            "31410000-0011-2358-c000-0000beef1001"
        );
        assert_eq!(
            map.uuid(Channel::D).to_string(),
            "31410000-0011-2358-c000-0000beef0003"
        );
    }

    #[test]
    fn test_iter_follows_column_order() {
        let map = ChannelMap::default();
        let channels: Vec<Channel> = map.iter().map(|(channel, _)| channel).collect();
        assert_eq!(channels, Channel::ALL.to_vec());
        for (i, channel) in Channel::ALL.iter().enumerate() {
            assert_eq!(channel.index(), i);
        }
    }
}
