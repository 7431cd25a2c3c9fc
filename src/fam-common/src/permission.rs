//! UNIX-style permission checks shared by the metadata service (which owns
//! the authoritative check) and the client-interface service (which performs
//! a first-pass check before fanning out to avoid unnecessary MS round
//! trips).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
    /// Atomics that update memory require both read and write permission.
    ReadWrite,
}

/// Mirrors `st_mode`-style rwx bits for user/group/other, packed as a
/// standard octal UNIX mode (e.g. `0o640`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode(pub u32);

impl Mode {
    const OWNER_R: u32 = 0o400;
    const OWNER_W: u32 = 0o200;
    const GROUP_R: u32 = 0o040;
    const GROUP_W: u32 = 0o020;
    const OTHER_R: u32 = 0o004;
    const OTHER_W: u32 = 0o002;

    /// Returns true if `uid`/`gid` may perform `op` given the object's
    /// `owner_uid`/`owner_gid` and this mode.
    pub fn allows(
        &self,
        op: Op,
        owner_uid: u32,
        owner_gid: u32,
        caller_uid: u32,
        caller_gid: u32,
    ) -> bool {
        let (r_bit, w_bit) = if caller_uid == owner_uid {
            (Self::OWNER_R, Self::OWNER_W)
        } else if caller_gid == owner_gid {
            (Self::GROUP_R, Self::GROUP_W)
        } else {
            (Self::OTHER_R, Self::OTHER_W)
        };

        match op {
            Op::Read => self.0 & r_bit != 0,
            Op::Write => self.0 & w_bit != 0,
            Op::ReadWrite => self.0 & r_bit != 0 && self.0 & w_bit != 0,
        }
    }

    /// Change-of-permission is allowed only to the owner uid.
    pub fn may_change(owner_uid: u32, caller_uid: u32) -> bool {
        owner_uid == caller_uid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_only_mode_denies_others() {
        let mode = Mode(0o400);
        assert!(mode.allows(Op::Read, 1000, 100, 1000, 100));
        assert!(!mode.allows(Op::Write, 1000, 100, 1000, 100));
        assert!(!mode.allows(Op::Read, 1000, 100, 2000, 100));
    }

    #[test]
    fn group_fallback_applies_when_uid_mismatches() {
        let mode = Mode(0o460);
        assert!(mode.allows(Op::Read, 1000, 100, 2000, 100));
        assert!(!mode.allows(Op::Write, 1000, 100, 2000, 100));
    }

    #[test]
    fn world_writable_allows_other() {
        let mode = Mode(0o777);
        assert!(mode.allows(Op::ReadWrite, 1000, 100, 3000, 300));
    }

    #[test]
    fn change_permission_requires_owner_uid() {
        assert!(Mode::may_change(1000, 1000));
        assert!(!Mode::may_change(1000, 2000));
    }
}
