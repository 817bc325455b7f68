use crate::catalog::Channel;
use crate::view::ViewModel;
use serde::{Deserialize, Serialize};

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Presentation clients check this on connect and can refuse
/// to talk to an incompatible engine.
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages sent from a presentation client to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    SelectChannel { channel: Channel },
    StartPlayback,
    RefreshSchedule,
    /// Start the provider login flow: the engine answers with an
    /// `ActivationCode` broadcast for the web view.
    BeginActivation,
    Activate { provider_id: String },
    SignOut,
    /// Presentation layer going to background.
    Suspend,
    /// Presentation layer returning to foreground.
    Resume,
    GetView,
}

/// Everything needed to hand a program off to the player screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackData {
    pub content_id: String,
    pub title: String,
    pub playback_url: String,
    pub channel: Channel,
}

/// Messages sent from the engine to presentation clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: engine version + full view snapshot.
    Hello {
        protocol_version: u32,
        view_rev: u64,
        view: ViewModel,
    },
    View {
        data: ViewModel,
    },
    /// Player-screen handoff for the current program.
    Playback {
        data: PlaybackData,
        authenticated: bool,
    },
    /// Registration code for the provider login web view.
    ActivationCode {
        code: String,
    },
    Error {
        message: String,
    },
    Log {
        message: String,
    },
}

/// Wrapper for socket communication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_encode_decode() {
        let msg = Message::Command(Command::SelectChannel {
            channel: Channel::Secondary,
        });
        let encoded = msg.encode().unwrap();
        let (decoded, len) = Message::decode(&encoded).unwrap();
        assert_eq!(len, encoded.len());
        match decoded {
            Message::Command(Command::SelectChannel { channel }) => {
                assert_eq!(channel, Channel::Secondary)
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_hello_encode_decode() {
        let view = ViewModel {
            rev: 42,
            ..Default::default()
        };
        let msg = Message::Broadcast(Broadcast::Hello {
            protocol_version: PROTOCOL_VERSION,
            view_rev: 42,
            view,
        });
        let encoded = msg.encode().unwrap();
        let (decoded, _) = Message::decode(&encoded).unwrap();
        match decoded {
            Message::Broadcast(Broadcast::Hello {
                protocol_version,
                view_rev,
                ..
            }) => {
                assert_eq!(protocol_version, PROTOCOL_VERSION);
                assert_eq!(view_rev, 42);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_decode_partial_frame() {
        let msg = Message::Command(Command::StartPlayback);
        let encoded = msg.encode().unwrap();
        assert!(Message::decode(&encoded[..encoded.len() - 1]).is_err());
        assert!(Message::decode(&encoded[..2]).is_err());
    }
}
