//! Command envelope and command set.
//!
//! The envelope is the structured record sent as the first frame of every
//! protocol message. Its command determines how many framed segments follow
//! on the same stream: `store` and `download` carry exactly one payload frame
//! after the envelope, `fetch` and `delete` carry none.

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::frame::FrameError;

/// Protocol commands.
///
/// A closed set with an explicit fallback: any unrecognized wire value decodes
/// to [`Command::Unknown`] rather than failing, so a peer speaking a newer
/// protocol revision does not tear down the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store a payload under the envelope's key.
    Store,
    /// Retrieve a stored payload.
    Fetch,
    /// Remove a stored payload.
    Delete,
    /// Server-to-client response tag carrying a fetch result.
    Download,
    /// Any command value outside the known set, preserved verbatim.
    Unknown(String),
}

impl Command {
    /// Returns the wire representation of the command.
    pub fn as_str(&self) -> &str {
        match self {
            Command::Store => "store",
            Command::Fetch => "fetch",
            Command::Delete => "delete",
            Command::Download => "download",
            Command::Unknown(other) => other,
        }
    }
}

impl From<&str> for Command {
    fn from(value: &str) -> Self {
        match value {
            "store" => Command::Store,
            "fetch" => Command::Fetch,
            "delete" => Command::Delete,
            "download" => Command::Download,
            other => Command::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CommandVisitor;

        impl Visitor<'_> for CommandVisitor {
            type Value = Command;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a command string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Command, E> {
                Ok(Command::from(value))
            }
        }

        deserializer.deserialize_str(CommandVisitor)
    }
}

/// The wire command unit exchanged as the first frame of every message.
///
/// Field names are part of the wire format and must round-trip exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Object key; the sole input to storage path derivation.
    #[serde(rename = "ID")]
    pub id: String,
    /// File name without extension.
    #[serde(rename = "Filename")]
    pub filename: String,
    /// File extension without the leading dot.
    #[serde(rename = "Extension")]
    pub extension: String,
    /// The command to dispatch on.
    #[serde(rename = "Command")]
    pub command: Command,
    /// Identifier of the node that originated the request.
    #[serde(rename = "OriginID")]
    pub origin_id: String,
}

impl Envelope {
    /// Creates an envelope for the given object key and command.
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        extension: impl Into<String>,
        command: Command,
        origin_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            extension: extension.into(),
            command,
            origin_id: origin_id.into(),
        }
    }

    /// Returns `{filename}.{extension}`, the on-disk object name.
    pub fn object_name(&self) -> String {
        format!("{}.{}", self.filename, self.extension)
    }

    /// Returns a copy of this envelope retagged with a different command.
    pub fn with_command(&self, command: Command) -> Self {
        Self {
            command,
            ..self.clone()
        }
    }

    /// Serializes the envelope to its wire encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        serde_json::to_vec(self).map_err(FrameError::Encode)
    }

    /// Deserializes an envelope from its wire encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        serde_json::from_slice(bytes).map_err(FrameError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_roundtrip() {
        for cmd in ["store", "fetch", "delete", "download"] {
            assert_eq!(Command::from(cmd).as_str(), cmd);
        }
    }

    #[test]
    fn test_unknown_command_preserved() {
        let cmd = Command::from("bogus");
        assert_eq!(cmd, Command::Unknown("bogus".to_string()));
        assert_eq!(cmd.as_str(), "bogus");
    }

    #[test]
    fn test_envelope_field_names() {
        let envelope = Envelope::new("1", "a", "txt", Command::Store, "node-1");
        let json: serde_json::Value =
            serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();

        assert_eq!(json["ID"], "1");
        assert_eq!(json["Filename"], "a");
        assert_eq!(json["Extension"], "txt");
        assert_eq!(json["Command"], "store");
        assert_eq!(json["OriginID"], "node-1");
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope::new("42", "report", "pdf", Command::Fetch, "origin");
        let bytes = envelope.to_bytes().unwrap();
        let restored = Envelope::from_bytes(&bytes).unwrap();
        assert_eq!(restored, envelope);
    }

    #[test]
    fn test_envelope_unknown_command_decodes() {
        let raw = br#"{"ID":"1","Filename":"a","Extension":"txt","Command":"bogus","OriginID":"x"}"#;
        let envelope = Envelope::from_bytes(raw).unwrap();
        assert_eq!(envelope.command, Command::Unknown("bogus".to_string()));
    }

    #[test]
    fn test_with_command_retag() {
        let request = Envelope::new("1", "a", "txt", Command::Fetch, "node-1");
        let response = request.with_command(Command::Download);
        assert_eq!(response.command, Command::Download);
        assert_eq!(response.id, request.id);
        assert_eq!(response.object_name(), "a.txt");
    }
}
