//! Path translation between the WSL mount namespace and native Windows paths.
//!
//! A WSL path of the form `/mnt/<letter>/<rest>` maps onto drive `<LETTER>:`.
//! Anything else is left alone, which covers paths that are already native
//! Windows paths and paths on hosts where no translation applies.

const MOUNT_ROOT: &str = "/mnt/";

/// Translate a WSL mount path into its native Windows form.
///
/// `/mnt/c/Users/me/project` becomes `C:\Users\me\project`. Inputs that do not
/// match the mount pattern are returned unchanged, so translating twice is the
/// same as translating once.
pub fn to_windows_path(path: &str) -> String {
    let Some((letter, rest)) = split_mount(path) else {
        return path.to_string();
    };
    let mut out = String::with_capacity(path.len());
    out.push(letter.to_ascii_uppercase());
    out.push(':');
    out.push('\\');
    out.push_str(&rest.trim_start_matches('/').replace('/', "\\"));
    out
}

/// Map a native Windows drive path back into the WSL mount namespace.
///
/// `C:\Users\me` becomes `/mnt/c/Users/me`. Inputs without a drive prefix
/// are returned unchanged.
pub fn to_wsl_path(path: &str) -> String {
    let bytes = path.as_bytes();
    if bytes.len() < 2 || !bytes[0].is_ascii_alphabetic() || bytes[1] != b':' {
        return path.to_string();
    }
    if bytes.len() > 2 && bytes[2] != b'\\' && bytes[2] != b'/' {
        // Drive-relative paths like "C:foo" have no mount equivalent.
        return path.to_string();
    }
    let letter = (bytes[0] as char).to_ascii_lowercase();
    let rest = path[2..].replace('\\', "/");
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        format!("{MOUNT_ROOT}{letter}")
    } else {
        format!("{MOUNT_ROOT}{letter}/{rest}")
    }
}

/// Whether `path` lies in the WSL drive mount namespace.
pub fn is_wsl_mount_path(path: &str) -> bool {
    split_mount(path).is_some()
}

// "/mnt/c" or "/mnt/c/..." with exactly one lowercase drive letter.
fn split_mount(path: &str) -> Option<(char, &str)> {
    let tail = path.strip_prefix(MOUNT_ROOT)?;
    let mut chars = tail.chars();
    let letter = chars.next()?;
    if !letter.is_ascii_lowercase() {
        return None;
    }
    let rest = chars.as_str();
    if rest.is_empty() || rest.starts_with('/') {
        Some((letter, rest))
    } else {
        None
    }
}
