//! File ownership and permission checks

use crate::findings::Findings;
use kube_stig_core::Outcome;
use std::path::Path;

/// Mode bits and ownership of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl FileStat {
    #[cfg(unix)]
    pub fn read(path: &Path) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            mode: meta.mode() & 0o7777,
            uid: meta.uid(),
            gid: meta.gid(),
        })
    }

    #[cfg(not(unix))]
    pub fn read(_path: &Path) -> Option<Self> {
        None
    }

    /// Whether any permission bit outside `max` is set
    pub fn more_permissive_than(&self, max: u32) -> bool {
        self.mode & !max != 0
    }
}

/// Passes when the file exists and is owned by root:root
pub fn owned_by_root(path: Option<&str>, what: &str) -> Outcome {
    let Some(path) = path else {
        return Outcome::fail(format!("The {} path could not be determined.", what));
    };
    if !cfg!(unix) {
        return windows_review(path, what);
    }

    let Some(stat) = FileStat::read(Path::new(path)) else {
        return Outcome::fail(format!("The {} {} must exist.", what, path));
    };

    let mut findings = Findings::new();
    findings
        .expect(stat.uid == 0, || {
            format!("The {} {} must be owned by root. Current owner uid: {}", what, path, stat.uid)
        })
        .expect(stat.gid == 0, || {
            format!(
                "The {} {} must have root as group owner. Current group gid: {}",
                what, path, stat.gid
            )
        });
    findings.into_outcome()
}

/// Passes when the file exists and its mode is `max` or more restrictive
pub fn mode_at_most(path: Option<&str>, max: u32, what: &str) -> Outcome {
    let Some(path) = path else {
        return Outcome::fail(format!("The {} path could not be determined.", what));
    };
    if !cfg!(unix) {
        return windows_review(path, what);
    }

    match FileStat::read(Path::new(path)) {
        None => Outcome::fail(format!("The {} {} must exist.", what, path)),
        Some(stat) if stat.more_permissive_than(max) => Outcome::fail(format!(
            "The {} {} must have permissions {:04o} or more restrictive. Current permissions: {:04o}",
            what, path, max, stat.mode
        )),
        Some(_) => Outcome::Pass,
    }
}

fn windows_review(path: &str, what: &str) -> Outcome {
    Outcome::not_reviewed(format!(
        "Review the ACL of the {} {}: only NT AUTHORITY\\SYSTEM and BUILTIN\\Administrators may have FullControl.",
        what, path
    ))
}
