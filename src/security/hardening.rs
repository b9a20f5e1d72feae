//! Builds the [`HardeningDescriptor`] the Engine Adapter attaches to every
//! created container, parameterized by [`SecurityLevel`] and language.

use crate::engine::types::{HardeningDescriptor, SeccompProfile};
use crate::language::Language;

use super::SecurityLevel;

const BASE_ALLOWED_SYSCALLS: &[&str] = &[
    "read", "write", "open", "openat", "close", "stat", "fstat", "lstat", "mmap", "mprotect",
    "munmap", "brk", "rt_sigaction", "rt_sigprocmask", "ioctl", "pread64", "pwrite64", "access",
    "pipe", "select", "dup", "dup2", "getpid", "clone", "execve", "exit", "exit_group", "wait4",
    "futex", "sched_yield", "nanosleep", "getrlimit", "rt_sigreturn", "socket", "connect",
    "accept", "sendto", "recvfrom", "fcntl",
];

const BLOCKED_SYSCALLS: &[&str] = &[
    "unshare", "setns", "mount", "umount2", "ptrace", "init_module", "finit_module",
    "delete_module", "kexec_load", "reboot", "bpf", "perf_event_open", "keyctl", "add_key",
    "userfaultfd", "open_by_handle_at", "name_to_handle_at",
];

fn per_language_extra_syscalls(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python | Language::JavaScript | Language::TypeScript => {
            &["shmget", "shmat", "shmdt", "semget", "semop", "msgget"]
        }
        Language::Go | Language::Rust => &["clone3", "rseq"],
        Language::Bash => &[],
    }
}

/// Construct the hardening descriptor for `language` at `level`.
pub fn build_hardening_descriptor(language: Language, level: SecurityLevel) -> HardeningDescriptor {
    let mut allowed: Vec<String> = BASE_ALLOWED_SYSCALLS.iter().map(|s| s.to_string()).collect();
    allowed.extend(per_language_extra_syscalls(language).iter().map(|s| s.to_string()));

    let seccomp = SeccompProfile {
        allowed,
        blocked: BLOCKED_SYSCALLS.iter().map(|s| s.to_string()).collect(),
    };

    let (memory_bytes, cpu_quota, cpu_period, pids_limit, cap_add) = match level {
        SecurityLevel::Strict => (256 * 1024 * 1024, 50_000, 100_000, 64, vec![]),
        SecurityLevel::Standard => (
            512 * 1024 * 1024,
            100_000,
            100_000,
            128,
            vec!["CHOWN".to_string(), "SETUID".to_string(), "SETGID".to_string()],
        ),
        SecurityLevel::Permissive => (
            1024 * 1024 * 1024,
            200_000,
            100_000,
            256,
            vec!["CHOWN".to_string(), "SETUID".to_string(), "SETGID".to_string(), "DAC_OVERRIDE".to_string()],
        ),
    };

    let read_only_rootfs = !matches!(level, SecurityLevel::Permissive);
    let tmpfs_mounts = if read_only_rootfs {
        vec![("/tmp".to_string(), 64), ("/workspace/.cache".to_string(), 32)]
    } else {
        vec![]
    };

    HardeningDescriptor {
        memory_bytes,
        cpu_quota,
        cpu_period,
        pids_limit,
        seccomp,
        cap_drop: vec!["ALL".to_string()],
        cap_add,
        no_new_privileges: true,
        read_only_rootfs,
        tmpfs_mounts,
        user: "1000:1000".to_string(),
        ulimit_nofile: 256,
        ulimit_nproc: pids_limit as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_drops_all_capabilities_and_adds_none() {
        let descriptor = build_hardening_descriptor(Language::Python, SecurityLevel::Strict);
        assert_eq!(descriptor.cap_drop, vec!["ALL".to_string()]);
        assert!(descriptor.cap_add.is_empty());
        assert!(descriptor.read_only_rootfs);
    }

    #[test]
    fn standard_reallows_chown_setuid_setgid() {
        let descriptor = build_hardening_descriptor(Language::Python, SecurityLevel::Standard);
        assert!(descriptor.cap_add.contains(&"CHOWN".to_string()));
        assert!(descriptor.cap_add.contains(&"SETUID".to_string()));
    }

    #[test]
    fn seccomp_blocklist_always_includes_mount_and_ptrace() {
        let descriptor = build_hardening_descriptor(Language::Go, SecurityLevel::Permissive);
        assert!(descriptor.seccomp.blocked.contains(&"mount".to_string()));
        assert!(descriptor.seccomp.blocked.contains(&"ptrace".to_string()));
    }

    #[test]
    fn runs_as_unprivileged_user_at_every_level() {
        for level in [SecurityLevel::Strict, SecurityLevel::Standard, SecurityLevel::Permissive] {
            assert_eq!(build_hardening_descriptor(Language::Rust, level).user, "1000:1000");
        }
    }
}
