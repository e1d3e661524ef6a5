use buspolicy_core::{Gid, Uid};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Disposition — allow or deny, fixed when the element opens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Allow,
    Deny,
}

impl Disposition {
    /// Map an element name inside `<policy>` to a disposition.
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "allow" => Some(Disposition::Allow),
            "deny" => Some(Disposition::Deny),
            _ => None,
        }
    }

    /// The element name whose closing tag terminates a rule of this disposition.
    pub fn element_name(self) -> &'static str {
        match self {
            Disposition::Allow => "allow",
            Disposition::Deny => "deny",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

// ---------------------------------------------------------------------------
// RuleClass — which bus operation a rule governs
// ---------------------------------------------------------------------------

/// The kind of bus operation a rule governs.
///
/// Unrelated to [`crate::store::Category`]: an `AssumeUser` rule may live in
/// the default category, and a `Send` rule may live in a per-user chain.
/// A rule under construction has no class yet; a completed [`Rule`] always
/// has exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleClass {
    Send,
    Receive,
    Own,
    OwnPrefix,
    AssumeUser,
    AssumeGroup,
}

impl fmt::Display for RuleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleClass::Send => write!(f, "send_"),
            RuleClass::Receive => write!(f, "receive_"),
            RuleClass::Own => write!(f, "own"),
            RuleClass::OwnPrefix => write!(f, "own_prefix"),
            RuleClass::AssumeUser => write!(f, "user"),
            RuleClass::AssumeGroup => write!(f, "group"),
        }
    }
}

// ---------------------------------------------------------------------------
// MessageType — the send_type / receive_type string table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    MethodCall,
    MethodReturn,
    Error,
    Signal,
}

impl MessageType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "method_call" => Some(MessageType::MethodCall),
            "method_return" => Some(MessageType::MethodReturn),
            "error" => Some(MessageType::Error),
            "signal" => Some(MessageType::Signal),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::MethodCall => "method_call",
            MessageType::MethodReturn => "method_return",
            MessageType::Error => "error",
            MessageType::Signal => "signal",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RuleField — the write-once slots of a rule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleField {
    Interface,
    Member,
    Error,
    Path,
    MessageType,
    /// Destination, sender, owned name, or assumed user/group name.
    Name,
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleField::Interface => write!(f, "interface"),
            RuleField::Member => write!(f, "member"),
            RuleField::Error => write!(f, "error"),
            RuleField::Path => write!(f, "path"),
            RuleField::MessageType => write!(f, "message type"),
            RuleField::Name => write!(f, "name"),
        }
    }
}

/// Rejections raised while a rule is being assembled. The state machine
/// attaches the source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuleBuildError {
    #[error("duplicate {0} attribute")]
    Duplicate(RuleField),

    #[error("mixing {existing} and {requested} attributes on the same rule")]
    ClassMismatch {
        existing: RuleClass,
        requested: RuleClass,
    },
}

// ---------------------------------------------------------------------------
// Rule — one completed <allow>/<deny> entry
// ---------------------------------------------------------------------------

/// A completed access rule. Immutable: all fields are set through
/// [`RuleBuilder`] while the element is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    disposition: Disposition,
    class: RuleClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    member: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_type: Option<MessageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    principal_uid: Option<Uid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    principal_gid: Option<Gid>,
}

impl Rule {
    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    pub fn class(&self) -> RuleClass {
        self.class
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    pub fn member(&self) -> Option<&str> {
        self.member.as_deref()
    }

    pub fn error_name(&self) -> Option<&str> {
        self.error_name.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.message_type
    }

    /// Destination (send), sender (receive), owned name or name prefix
    /// (own/own_prefix), or the assumed user/group name.
    pub fn target_name(&self) -> Option<&str> {
        self.target_name.as_deref()
    }

    pub fn principal_uid(&self) -> Option<Uid> {
        self.principal_uid
    }

    pub fn principal_gid(&self) -> Option<Gid> {
        self.principal_gid
    }
}

/// Accumulates a rule while its element is open.
///
/// Every field is write-once, and the class may be assigned repeatedly
/// only with the same value.
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    disposition: Disposition,
    class: Option<RuleClass>,
    interface: Option<String>,
    member: Option<String>,
    error_name: Option<String>,
    path: Option<String>,
    message_type: Option<MessageType>,
    target_name: Option<String>,
    principal_uid: Option<Uid>,
    principal_gid: Option<Gid>,
}

impl RuleBuilder {
    pub fn new(disposition: Disposition) -> Self {
        Self {
            disposition,
            class: None,
            interface: None,
            member: None,
            error_name: None,
            path: None,
            message_type: None,
            target_name: None,
            principal_uid: None,
            principal_gid: None,
        }
    }

    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    pub fn class(&self) -> Option<RuleClass> {
        self.class
    }

    pub fn assign_class(&mut self, class: RuleClass) -> Result<(), RuleBuildError> {
        match self.class {
            Some(existing) if existing != class => Err(RuleBuildError::ClassMismatch {
                existing,
                requested: class,
            }),
            _ => {
                self.class = Some(class);
                Ok(())
            }
        }
    }

    /// Set one of the string-valued fields.
    ///
    /// `RuleField::MessageType` is typed and must go through
    /// [`RuleBuilder::set_message_type`]; passing it here is reported as a
    /// duplicate so it can never be silently stored as text.
    pub fn set_text(&mut self, field: RuleField, value: String) -> Result<(), RuleBuildError> {
        let slot = match field {
            RuleField::Interface => &mut self.interface,
            RuleField::Member => &mut self.member,
            RuleField::Error => &mut self.error_name,
            RuleField::Path => &mut self.path,
            RuleField::Name => &mut self.target_name,
            RuleField::MessageType => return Err(RuleBuildError::Duplicate(field)),
        };
        if slot.is_some() {
            return Err(RuleBuildError::Duplicate(field));
        }
        *slot = Some(value);
        Ok(())
    }

    pub fn has_message_type(&self) -> bool {
        self.message_type.is_some()
    }

    pub fn set_message_type(&mut self, message_type: MessageType) -> Result<(), RuleBuildError> {
        if self.message_type.is_some() {
            return Err(RuleBuildError::Duplicate(RuleField::MessageType));
        }
        self.message_type = Some(message_type);
        Ok(())
    }

    pub fn set_principal_uid(&mut self, uid: Uid) {
        self.principal_uid = Some(uid);
    }

    pub fn set_principal_gid(&mut self, gid: Gid) {
        self.principal_gid = Some(gid);
    }

    /// Freeze the rule. Returns `None` when no class was ever assigned.
    pub fn finish(self) -> Option<Rule> {
        let class = self.class?;
        Some(Rule {
            disposition: self.disposition,
            class,
            interface: self.interface,
            member: self.member,
            error_name: self.error_name,
            path: self.path,
            message_type: self.message_type,
            target_name: self.target_name,
            principal_uid: self.principal_uid,
            principal_gid: self.principal_gid,
        })
    }
}
