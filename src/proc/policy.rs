//! Introspection policy: a process may inspect itself and its direct
//! children, nothing else.

use super::process::Process;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

/// Decide whether `requester` may read `subject`'s registers.
pub fn check(requester: &Process, subject: &Process) -> Verdict {
    if requester.pid() == subject.pid() || subject.parent_pid() == Some(requester.pid()) {
        Verdict::Allow
    } else {
        Verdict::Deny
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;
    use crate::mm::{AddressSpace, PhysMemory};
    use crate::proc::Pid;

    fn process(pid: Pid, parent: Option<Pid>) -> Process {
        let space = AddressSpace::new(Arc::new(PhysMemory::new(4))).unwrap();
        Process::new(pid, parent, space)
    }

    #[test]
    fn test_self_and_parent_allowed() {
        let parent = process(1, None);
        let child = process(2, Some(1));
        assert_eq!(check(&child, &child), Verdict::Allow);
        assert_eq!(check(&parent, &child), Verdict::Allow);
    }

    #[test]
    fn test_child_sibling_and_grandparent_denied() {
        let grandparent = process(1, None);
        let parent = process(2, Some(1));
        let child = process(3, Some(2));
        let sibling = process(4, Some(2));

        assert_eq!(check(&child, &parent), Verdict::Deny);
        assert_eq!(check(&sibling, &child), Verdict::Deny);
        assert_eq!(check(&grandparent, &child), Verdict::Deny);
    }
}
