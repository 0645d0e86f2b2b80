//! Declarative syntax of a TLV protocol.

use crate::error::InternalError;
use crate::factory::MessageFactory;
use crate::message::Body;
use crate::{Tag, Version};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Constraints of one parameter inside one command.
#[derive(Clone)]
pub struct ParameterSyntax {
    /// Child protocol when the parameter is a compound TLV structure.
    pub compound: Option<Arc<Protocol>>,
    /// Minimum value size in bytes (ignored for compound parameters).
    pub min_size: usize,
    /// Maximum value size in bytes (ignored for compound parameters).
    pub max_size: usize,
    /// Minimum number of occurrences inside the command.
    pub min_count: usize,
    /// Maximum number of occurrences inside the command.
    pub max_count: usize,
}

/// Parameters of one declared command.
#[derive(Clone, Default)]
pub struct CommandSyntax {
    params: BTreeMap<Tag, ParameterSyntax>,
}

impl CommandSyntax {
    pub fn parameter(&self, tag: Tag) -> Option<&ParameterSyntax> {
        self.params.get(&tag)
    }

    pub fn parameters(&self) -> impl Iterator<Item = (Tag, &ParameterSyntax)> {
        self.params.iter().map(|(tag, syntax)| (*tag, syntax))
    }
}

/// The syntax of a TLV protocol: an optional version number and the table of
/// commands with their parameter constraints. Used by [`MessageFactory`] to
/// validate incoming messages.
///
/// Commands outside the table are unknown; parameters of a command outside
/// its declaration are unknown.
#[derive(Clone, Default)]
pub struct Protocol {
    version: Option<Version>,
    commands: BTreeMap<Tag, CommandSyntax>,
}

impl Protocol {
    /// Syntax for a protocol without version prefix.
    pub fn new() -> Self {
        Protocol::default()
    }

    /// Syntax for a protocol whose messages start with a version byte.
    pub fn with_version(version: Version) -> Self {
        Protocol { version: Some(version), commands: BTreeMap::new() }
    }

    /// Change the protocol version number.
    pub fn set_version(&mut self, version: Version) {
        self.version = Some(version);
    }

    /// The expected version byte, if the protocol is versioned.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn has_version(&self) -> bool {
        self.version.is_some()
    }

    /// Declare a command tag. Required only for commands without parameters.
    pub fn add(&mut self, cmd_tag: Tag) {
        self.commands.entry(cmd_tag).or_default();
    }

    /// Declare one leaf parameter of a command. Must be invoked once per
    /// parameter of each command.
    pub fn add_parameter(
        &mut self,
        cmd_tag: Tag,
        param_tag: Tag,
        min_size: usize,
        max_size: usize,
        min_count: usize,
        max_count: usize,
    ) {
        self.commands.entry(cmd_tag).or_default().params.insert(
            param_tag,
            ParameterSyntax { compound: None, min_size, max_size, min_count, max_count },
        );
    }

    /// Declare a compound parameter whose value must itself parse as a
    /// message of `compound`.
    pub fn add_compound(
        &mut self,
        cmd_tag: Tag,
        param_tag: Tag,
        compound: Arc<Protocol>,
        min_count: usize,
        max_count: usize,
    ) {
        self.commands.entry(cmd_tag).or_default().params.insert(
            param_tag,
            ParameterSyntax { compound: Some(compound), min_size: 0, max_size: 0, min_count, max_count },
        );
    }

    pub(crate) fn command(&self, tag: Tag) -> Option<&CommandSyntax> {
        self.commands.get(&tag)
    }
}

/// A concrete protocol binding: its syntax table plus the construction of
/// typed messages from a validated [`MessageFactory`] and of the
/// protocol-appropriate error reply for a faulty peer.
pub trait ProtocolDefinition {
    /// The per-command message sum type of this protocol.
    type Body: Body;

    /// The declarative syntax the factory validates against.
    fn syntax(&self) -> &Protocol;

    /// Protocol identity, used in diagnostics only.
    fn name(&self) -> &'static str;

    /// Construct the concrete message for a successfully validated factory.
    ///
    /// Fails with [`InternalError`] when a command tag declared in the syntax
    /// has no corresponding concrete message type.
    fn build(&self, fact: &MessageFactory<'_>) -> Result<Self::Body, InternalError>;

    /// Build the error reply for a message that failed validation.
    fn error_response(&self, fact: &MessageFactory<'_>) -> Self::Body;
}
