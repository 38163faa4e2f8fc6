//! Path types tailored to `targ`.
//!
//! Plain `PathBuf`s don't distinguish "this is definitely absolute" from
//! "this is definitely a directory", so it's easy to accidentally join a
//! relative fragment onto another relative fragment, or pass a file where a
//! directory is expected. `TypedPath<Base, Type>` encodes both distinctions
//! in the type so the compiler catches the mistake instead of the runtime.
//!
//! This module does not normalize paths: `a/b` and `a/b/` are not considered
//! equal, and `..` components are preserved as-is. Callers that need
//! normalized paths should normalize before constructing a `TypedPath`.

use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    marker::PhantomData,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

use color_eyre::{
    Report, Result,
    eyre::{Context, bail},
};
use derive_more::Display;
use duplicate::duplicate_item;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type RelFilePath = TypedPath<Rel, File>;
pub type RelDirPath = TypedPath<Rel, Dir>;
pub type AbsFilePath = TypedPath<Abs, File>;
pub type AbsDirPath = TypedPath<Abs, Dir>;

/// Make an instance of a [`TypedPath<Rel, File>`] with compile-time validation.
#[macro_export]
macro_rules! mk_rel_file {
    ($path:literal) => {{
        $crate::assert_relative!($path);
        $crate::path::RelFilePath::try_from($path).unwrap()
    }};
}

/// Make an instance of a [`TypedPath<Rel, Dir>`] with compile-time validation.
#[macro_export]
macro_rules! mk_rel_dir {
    ($path:literal) => {{
        $crate::assert_relative!($path);
        $crate::path::RelDirPath::try_from($path).unwrap()
    }};
}

/// Assert that the string literal provided describes a relative path.
#[doc(hidden)]
#[macro_export]
macro_rules! assert_relative {
    ($path:literal) => {{
        #[cfg(unix)]
        const _: () = {
            assert!(!const_str::starts_with!($path, '/'), "path is not relative");
        };
    }};
}

/// An absolute path always begins from the root of the filesystem.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Abs;

/// A relative path describes steps from an undefined starting point.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Rel;

/// A directory contains other file system entries.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Dir;

/// A file contains data.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct File;

/// A location on the file system according to its type parameters.
///
/// This type is about intent, not existence: constructing a
/// `TypedPath<Abs, File>` for a file that doesn't exist yet is fine and
/// expected (for example, a cache entry path before the binary is built).
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display)]
#[display("{}", self.inner.display())]
pub struct TypedPath<Base, Type> {
    base: PhantomData<Base>,
    ty: PhantomData<Type>,
    inner: PathBuf,
}

impl<B, T> TypedPath<B, T> {
    /// View the path as a standard path.
    pub fn as_std_path(&self) -> &Path {
        &self.inner
    }

    /// View the path as a lossily-converted string.
    pub fn as_str_lossy(&self) -> Cow<'_, str> {
        self.inner.to_string_lossy()
    }

    /// View the path as an OS string.
    pub fn as_os_str(&self) -> &OsStr {
        self.inner.as_os_str()
    }

    /// Get the parent of this path, if one exists.
    pub fn parent(&self) -> Option<TypedPath<B, Dir>> {
        self.inner
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(ToOwned::to_owned)
            .map(TypedPath::new_unchecked)
    }

    /// Iterate through the components of the path.
    pub fn components(&self) -> impl DoubleEndedIterator<Item = Component<'_>> {
        self.inner.components()
    }

    /// Returns the final component of the path, if there is one.
    pub fn file_name(&self) -> Option<&OsStr> {
        self.inner.file_name()
    }

    /// Returns the final component of the path as a lossily-converted string.
    pub fn file_name_str_lossy(&self) -> Option<Cow<'_, str>> {
        self.inner.file_name().map(|s| s.to_string_lossy())
    }

    fn new_unchecked(inner: impl Into<PathBuf>) -> Self {
        Self {
            base: PhantomData,
            ty: PhantomData,
            inner: inner.into(),
        }
    }
}

#[duplicate_item(
    ty_from;
    [ PathBuf ];
    [ &PathBuf ];
    [ &Path ];
    [ String ];
    [ &String ];
    [ &str ];
    [ OsString ];
    [ &OsString ];
    [ &OsStr ];
)]
impl<B: Validator, T: Validator> TryFrom<ty_from> for TypedPath<B, T> {
    type Error = Report;

    fn try_from(value: ty_from) -> Result<Self, Self::Error> {
        #[allow(
            clippy::useless_conversion,
            reason = "useless only for the PathBuf variant of this macro expansion"
        )]
        let value = PathBuf::from(value);
        B::validate(&value).with_context(|| format!("validate base {:?}", B::type_name()))?;
        T::validate(&value).with_context(|| format!("validate type {:?}", T::type_name()))?;
        Ok(Self::new_unchecked(value))
    }
}

impl<B: Validator, T: Validator> FromStr for TypedPath<B, T> {
    type Err = Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl<B, T> From<TypedPath<B, T>> for PathBuf {
    fn from(value: TypedPath<B, T>) -> Self {
        value.inner
    }
}

impl<B, T> From<&TypedPath<B, T>> for PathBuf {
    fn from(value: &TypedPath<B, T>) -> Self {
        value.inner.clone()
    }
}

impl TypedPath<Abs, Dir> {
    /// Get the current working directory for the process.
    pub fn current() -> Result<Self> {
        let cwd = std::env::current_dir().context("get current dir")?;
        Self::try_from(cwd).context("convert cwd to absolute directory")
    }
}

impl<'de, B: Validator, T: Validator> Deserialize<'de> for TypedPath<B, T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let p = PathBuf::deserialize(deserializer)?;
        Self::try_from(p).map_err(serde::de::Error::custom)
    }
}

impl<B, T> Serialize for TypedPath<B, T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.inner.serialize(serializer)
    }
}

impl<B, T> std::fmt::Debug for TypedPath<B, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypedPath({:?})", self.inner)
    }
}

/// Makes a path relative to some base path.
pub trait RelativeTo<Other> {
    type Output;

    /// Make `self` relative to `other` if possible.
    fn relative_to(&self, other: Other) -> Self::Output;
}

#[duplicate_item(
    ty_other ty_self ty_output;
    [ &TypedPath<Abs, Dir> ] [ TypedPath<Abs, Dir> ] [ TypedPath<Rel, Dir> ];
    [ &TypedPath<Abs, Dir> ] [ TypedPath<Abs, File> ] [ TypedPath<Rel, File> ];
    [ &TypedPath<Abs, Dir> ] [ &TypedPath<Abs, Dir> ] [ TypedPath<Rel, Dir> ];
    [ &TypedPath<Abs, Dir> ] [ &TypedPath<Abs, File> ] [ TypedPath<Rel, File> ];
)]
impl RelativeTo<ty_other> for ty_self {
    type Output = Result<ty_output>;

    fn relative_to(&self, other: ty_other) -> Self::Output {
        self.inner
            .strip_prefix(&other.inner)
            .with_context(|| format!("make {:?} relative to {:?}", self.inner, other.inner))
            .and_then(TypedPath::try_from)
    }
}

/// Creates and joins a path from a string segment, validating the result.
pub trait TryJoinWith {
    /// Join `dir` to `self` as a directory.
    fn try_join_dir(&self, dir: impl AsRef<str>) -> Result<AbsDirPath>;

    /// Join `file` to `self` as a file.
    fn try_join_file(&self, file: impl AsRef<str>) -> Result<AbsFilePath>;
}

impl TryJoinWith for TypedPath<Abs, Dir> {
    fn try_join_dir(&self, other: impl AsRef<str>) -> Result<AbsDirPath> {
        AbsDirPath::try_from(self.inner.join(other.as_ref()))
    }

    fn try_join_file(&self, other: impl AsRef<str>) -> Result<AbsFilePath> {
        AbsFilePath::try_from(self.inner.join(other.as_ref()))
    }
}

/// Infallibly joins known-valid typed paths together.
pub trait JoinWith<Other> {
    type Output;

    /// Join `other` onto `self`.
    fn join(&self, other: Other) -> Self::Output;
}

#[duplicate_item(
    ty_other ty_output;
    [ TypedPath<Rel, Dir> ] [ TypedPath<Abs, Dir> ];
    [ &TypedPath<Rel, Dir> ] [ TypedPath<Abs, Dir> ];
    [ TypedPath<Rel, File> ] [ TypedPath<Abs, File> ];
    [ &TypedPath<Rel, File> ] [ TypedPath<Abs, File> ];
)]
impl JoinWith<ty_other> for TypedPath<Abs, Dir> {
    type Output = ty_output;

    fn join(&self, other: ty_other) -> Self::Output {
        TypedPath::new_unchecked(self.inner.join(other.as_std_path()))
    }
}

/// Validates that a [`TypedPath`]'s inner path matches the constraints of
/// its `Base`/`Type` parameters, or returns an error explaining why not.
/// Every fallible `TypedPath` constructor is powered by this trait.
pub trait Validator {
    /// Validate that `path` satisfies this validator, or return an error.
    fn validate(path: &Path) -> Result<()>;

    /// The name of the validator, for use in error messages.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl Validator for Rel {
    fn validate(path: &Path) -> Result<()> {
        if !path.is_relative() {
            bail!("path is not relative: {path:?}");
        }
        Ok(())
    }
}

impl Validator for Abs {
    fn validate(path: &Path) -> Result<()> {
        if !path.is_absolute() {
            bail!("path is not absolute: {path:?}");
        }
        Ok(())
    }
}

#[duplicate_item(ty_self; [ Dir ]; [ File ];)]
impl Validator for ty_self {
    fn validate(_: &Path) -> Result<()> {
        Ok(())
    }
}
