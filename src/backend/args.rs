// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Backend-independent stage arguments
//!
//! Paths are kept as absolute logical paths until a backend renders them:
//! relative to the mount root for a container, absolute for local binaries.

use std::path::{Component, Path, PathBuf};

/// One argument of a tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A literal token such as `-iterations` or `-ascii`
    Literal(String),
    /// A file or directory
    Path(PathBuf),
}

impl Arg {
    pub fn literal(value: impl ToString) -> Self {
        Self::Literal(value.to_string())
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }
}

/// How paths are written on the command line
#[derive(Debug, Clone, Copy)]
pub enum PathForm<'a> {
    /// Relative to a bind-mounted directory
    RelativeTo(&'a Path),
    /// As-is (absolute)
    Absolute,
}

impl PathForm<'_> {
    pub fn render(&self, path: &Path) -> String {
        match self {
            Self::RelativeTo(root) => relative_path(path, root).to_string_lossy().into_owned(),
            Self::Absolute => path.to_string_lossy().into_owned(),
        }
    }
}

/// Render an argument list in the given path form
pub fn render_args(args: &[Arg], form: PathForm<'_>) -> Vec<String> {
    args.iter()
        .map(|arg| match arg {
            Arg::Literal(s) => s.clone(),
            Arg::Path(p) => form.render(p),
        })
        .collect()
}

/// Make `path` absolute by joining it onto `base` when it is relative
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Lexical relative path from `base` to `path`.
///
/// Both paths are expected to be absolute. Returns `.` when they are equal
/// and walks up with `..` when `path` is not below `base`.
pub fn relative_path(path: &Path, base: &Path) -> PathBuf {
    let path: Vec<Component<'_>> = normalize(path);
    let base: Vec<Component<'_>> = normalize(base);

    let common = path
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push("..");
    }
    for comp in &path[common..] {
        rel.push(comp.as_os_str());
    }

    if rel.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        rel
    }
}

fn normalize(path: &Path) -> Vec<Component<'_>> {
    let mut out: Vec<Component<'_>> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.last(), Some(Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push(comp);
                }
            }
            _ => out.push(comp),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_below_root() {
        let rel = relative_path(Path::new("/work/case1/seg.nii"), Path::new("/work/case1"));
        assert_eq!(rel, PathBuf::from("seg.nii"));
    }

    #[test]
    fn test_relative_path_of_root_is_dot() {
        let rel = relative_path(Path::new("/work/case1/"), Path::new("/work/case1"));
        assert_eq!(rel, PathBuf::from("."));
    }

    #[test]
    fn test_relative_path_outside_root() {
        let rel = relative_path(Path::new("/work/params/reg.txt"), Path::new("/work/case1"));
        assert_eq!(rel, PathBuf::from("../params/reg.txt"));
    }

    #[test]
    fn test_relative_path_ignores_dot_segments() {
        let rel = relative_path(Path::new("/work/case1/./a/../b.vtk"), Path::new("/work/case1"));
        assert_eq!(rel, PathBuf::from("b.vtk"));
    }

    #[test]
    fn test_render_args_by_form() {
        let args = vec![
            Arg::path("/work/in.nii"),
            Arg::literal("-iterations"),
            Arg::literal(2),
        ];

        let rel = render_args(&args, PathForm::RelativeTo(Path::new("/work")));
        assert_eq!(rel, vec!["in.nii", "-iterations", "2"]);

        let abs = render_args(&args, PathForm::Absolute);
        assert_eq!(abs, vec!["/work/in.nii", "-iterations", "2"]);
    }
}
