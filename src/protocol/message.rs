use super::Command;

/// Outbound application message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Values written to a virtual pin
    VirtualWrite {
        /// Pin number
        pin: String,
        /// Values, one field each
        values: Vec<String>,
    },

    /// Request for the server to push the stored values of some pins
    SyncVirtual {
        /// Pins to sync
        pins: Vec<String>,
    },

    /// Widget property of a pin, e.g. its colour or label
    SetProperty {
        /// Pin number
        pin: String,
        /// Property name
        property: String,
        /// Property values
        values: Vec<String>,
    },

    /// Push notification to the mobile app
    Notify(String),

    /// Tweet posted by the server
    Tweet(String),

    /// Email sent by the server
    Email {
        to: String,
        subject: String,
        body: String,
    },

    /// Entry in the device event log
    LogEvent {
        /// Event code
        name: String,
        /// Optional description
        description: Option<String>,
    },
}

impl Message {
    /// Creates a virtual pin write
    pub fn virtual_write<P, I, V>(pin: P, values: I) -> Self
    where
        P: ToString,
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Message::VirtualWrite {
            pin: pin.to_string(),
            values: values.into_iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Creates a sync request for the given pins
    pub fn sync_virtual<I, P>(pins: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: ToString,
    {
        Message::SyncVirtual {
            pins: pins.into_iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Creates a property update
    pub fn set_property<P, I, V>(pin: P, property: impl Into<String>, values: I) -> Self
    where
        P: ToString,
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Message::SetProperty {
            pin: pin.to_string(),
            property: property.into(),
            values: values.into_iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Command byte this message is sent with
    pub fn command(&self) -> Command {
        match self {
            Message::VirtualWrite { .. } => Command::Hardware,
            Message::SyncVirtual { .. } => Command::HardwareSync,
            Message::SetProperty { .. } => Command::Property,
            Message::Notify(_) => Command::Notify,
            Message::Tweet(_) => Command::Tweet,
            Message::Email { .. } => Command::Email,
            Message::LogEvent { .. } => Command::EventLog,
        }
    }

    /// Payload fields in wire order
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Message::VirtualWrite { pin, values } => {
                let mut fields = vec!["vw", pin.as_str()];
                fields.extend(values.iter().map(String::as_str));
                fields
            }
            Message::SyncVirtual { pins } => {
                let mut fields = vec!["vr"];
                fields.extend(pins.iter().map(String::as_str));
                fields
            }
            Message::SetProperty {
                pin,
                property,
                values,
            } => {
                let mut fields = vec![pin.as_str(), property.as_str()];
                fields.extend(values.iter().map(String::as_str));
                fields
            }
            Message::Notify(text) | Message::Tweet(text) => vec![text.as_str()],
            Message::Email { to, subject, body } => {
                vec![to.as_str(), subject.as_str(), body.as_str()]
            }
            Message::LogEvent { name, description } => match description {
                Some(description) => vec![name.as_str(), description.as_str()],
                None => vec![name.as_str()],
            },
        }
    }
}
