use buspolicy_core::{CoreError, CoreResult, Gid, IdentityResolver, Uid};
use nix::unistd::{Group, User};
use std::collections::HashMap;

/// Resolves names against the OS user and group databases.
///
/// A name made only of digits is taken as the numeric id itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIdentityResolver;

impl IdentityResolver for SystemIdentityResolver {
    fn resolve_user(&self, name: &str) -> CoreResult<Uid> {
        if let Some(id) = parse_numeric(name) {
            return Ok(Uid(id));
        }
        match User::from_name(name) {
            Ok(Some(user)) => Ok(Uid(user.uid.as_raw())),
            Ok(None) => Err(CoreError::UnknownUser(name.to_string())),
            Err(errno) => Err(CoreError::Identity(format!(
                "lookup of user '{}' failed: {}",
                name, errno
            ))),
        }
    }

    fn resolve_group(&self, name: &str) -> CoreResult<Gid> {
        if let Some(id) = parse_numeric(name) {
            return Ok(Gid(id));
        }
        match Group::from_name(name) {
            Ok(Some(group)) => Ok(Gid(group.gid.as_raw())),
            Ok(None) => Err(CoreError::UnknownGroup(name.to_string())),
            Err(errno) => Err(CoreError::Identity(format!(
                "lookup of group '{}' failed: {}",
                name, errno
            ))),
        }
    }
}

/// A fixed name table, for tests and for callers that resolved identities
/// up front.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    users: HashMap<String, Uid>,
    groups: HashMap<String, Gid>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, name: impl Into<String>, uid: u32) -> Self {
        self.insert_user(name, uid);
        self
    }

    pub fn with_group(mut self, name: impl Into<String>, gid: u32) -> Self {
        self.insert_group(name, gid);
        self
    }

    pub fn insert_user(&mut self, name: impl Into<String>, uid: u32) {
        self.users.insert(name.into(), Uid(uid));
    }

    pub fn insert_group(&mut self, name: impl Into<String>, gid: u32) {
        self.groups.insert(name.into(), Gid(gid));
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn resolve_user(&self, name: &str) -> CoreResult<Uid> {
        if let Some(uid) = self.users.get(name) {
            return Ok(*uid);
        }
        parse_numeric(name)
            .map(Uid)
            .ok_or_else(|| CoreError::UnknownUser(name.to_string()))
    }

    fn resolve_group(&self, name: &str) -> CoreResult<Gid> {
        if let Some(gid) = self.groups.get(name) {
            return Ok(*gid);
        }
        parse_numeric(name)
            .map(Gid)
            .ok_or_else(|| CoreError::UnknownGroup(name.to_string()))
    }
}

fn parse_numeric(name: &str) -> Option<u32> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}
