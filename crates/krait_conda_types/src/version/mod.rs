use std::{
    cmp::Ordering,
    fmt,
    fmt::{Debug, Display, Formatter},
    hash::{Hash, Hasher},
};

use itertools::{EitherOrBoth, Itertools};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

pub use parse::{ParseVersionError, ParseVersionErrorKind};

mod parse;

/// An ordered conda version.
///
/// Version strings consist of an optional epoch (`1!`), dot/underscore/dash
/// separated segments, and an optional local part behind a `+`. Each segment
/// is split into runs of numerals and letters; a segment that starts with a
/// letter gets an implicit leading `0` so that `1.1.a1` equals `1.1.0a1`.
/// Comparison is case-insensitive and proceeds segment by segment, component
/// by component:
///
/// * numbers compare numerically and beat letters,
/// * letters compare lexicographically,
/// * `dev` sorts below everything, `post` above everything,
/// * missing components count as `0`, so `1.1` equals `1.1.0`.
///
/// The resulting total order matches the one conda documents:
///
/// ```txt
///    0.4 < 0.4.1.rc == 0.4.1.RC < 0.4.1 < 0.5a1 < 0.5 < 0.9.6
///  < 1.0 < 1.1dev1 < 1.1_ < 1.1a1 < 1.1.0dev1 == 1.1.dev1 < 1.1.a1
///  < 1.1.0rc1 < 1.1.0 == 1.1 < 1.1.0post1 == 1.1.post1 < 1.1post1
///  < 1996.07.12 < 1!0.4.1 < 2!0.4.1
/// ```
///
/// Some projects (openssl most famously) use letters as release counters
/// rather than pre-release markers. Appending an underscore to the plain
/// version (`1.0.1_`) restores the intended order for those.
#[derive(Clone, Eq)]
pub struct Version {
    /// The trimmed, lower-cased source string.
    norm: Box<str>,

    /// The epoch, or 0 when the version did not specify one.
    epoch: u64,

    /// The flattened components of all segments, in order. For the version
    /// `1.2g.beta15` this holds `[1, 2, g, 0, beta, 15]`.
    components: SmallVec<[Component; 4]>,

    /// The number of components in each segment. For `1.2g.beta15` this holds
    /// `[1, 2, 3]`.
    segment_lengths: SmallVec<[u16; 4]>,

    /// Index into `segment_lengths` where the local part (behind `+`) starts.
    /// Equal to `segment_lengths.len()` when there is no local part.
    local_start: u16,
}

/// A single run within a version segment.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub(crate) enum Component {
    /// A numeric run, e.g. `15` in `beta15`.
    Numeral(u64),

    /// The literal `post`. Sorts above every other component.
    Post,

    /// The literal `dev`. Sorts below every other component.
    Dev,

    /// Any other alphabetic run, compared lexicographically. Sorts below
    /// numerals.
    Iden(Box<str>),
}

impl Component {
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Component::Numeral(value) => Some(*value),
            _ => None,
        }
    }

    fn is_numeral(&self) -> bool {
        matches!(self, Component::Numeral(_))
    }
}

impl Default for Component {
    fn default() -> Self {
        Component::Numeral(0)
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        use Component::*;
        match (self, other) {
            (Numeral(a), Numeral(b)) => a.cmp(b),
            (Iden(a), Iden(b)) => a.cmp(b),
            (Post, Post) | (Dev, Dev) => Ordering::Equal,

            (Post, _) => Ordering::Greater,
            (_, Post) => Ordering::Less,
            (Dev, _) => Ordering::Less,
            (_, Dev) => Ordering::Greater,

            // Numbers always order above strings.
            (Numeral(_), Iden(_)) => Ordering::Greater,
            (Iden(_), Numeral(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for Component {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Component::Numeral(n) => write!(f, "{n}"),
            Component::Iden(s) => write!(f, "{s}"),
            Component::Post => write!(f, "post"),
            Component::Dev => write!(f, "dev"),
        }
    }
}

impl Version {
    /// Returns the epoch of the version. Versions without an explicit epoch
    /// have epoch `0`.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns true if the version carries a local part (`1.2+3.4`).
    pub fn has_local(&self) -> bool {
        (self.local_start as usize) < self.segment_lengths.len()
    }

    /// Iterates over the segments of the common (non-local) part.
    pub(crate) fn segments(
        &self,
    ) -> impl DoubleEndedIterator<Item = &'_ [Component]> + ExactSizeIterator + '_ {
        self.segment_slices(0, self.local_start as usize)
    }

    /// Iterates over the segments of the local part (behind the `+`).
    pub(crate) fn local_segments(
        &self,
    ) -> impl DoubleEndedIterator<Item = &'_ [Component]> + ExactSizeIterator + '_ {
        self.segment_slices(self.local_start as usize, self.segment_lengths.len())
    }

    fn segment_slices(
        &self,
        from: usize,
        to: usize,
    ) -> impl DoubleEndedIterator<Item = &'_ [Component]> + ExactSizeIterator + '_ {
        let mut offsets = SmallVec::<[usize; 8]>::new();
        let mut idx = 0;
        for &len in &self.segment_lengths {
            offsets.push(idx);
            idx += len as usize;
        }
        let components = &self.components;
        let segment_lengths = &self.segment_lengths;
        (from..to).map(move |i| {
            let start = offsets[i];
            &components[start..start + segment_lengths[i] as usize]
        })
    }

    /// Tries to extract the major and minor version numbers. Returns `None`
    /// when the first two segments are not plain numbers.
    pub fn as_major_minor(&self) -> Option<(u64, u64)> {
        let mut segments = self.segments();
        let major = segments.next()?;
        let minor = segments.next()?;
        if major.len() == 1 && minor.len() == 1 {
            Some((major[0].as_number()?, minor[0].as_number()?))
        } else {
            None
        }
    }

    /// Returns true if any segment contains the special `dev` component.
    pub fn is_dev(&self) -> bool {
        self.components.iter().any(|c| matches!(c, Component::Dev))
    }

    /// Returns true when this version starts with `other`, segment-wise. Used
    /// for `=1.2` / `1.2.*` style matching.
    pub fn starts_with(&self, other: &Self) -> bool {
        self.epoch == other.epoch
            && segments_start_with(self.segments(), other.segments())
            && segments_start_with(self.local_segments(), other.local_segments())
    }

    /// Returns true when this version is "compatible" with `other` in the
    /// `~=` (PEP 440 compatible release) sense: at least `other`, and sharing
    /// every segment of `other` except the last.
    pub fn compatible_with(&self, other: &Self) -> bool {
        self >= other
            && self.epoch == other.epoch
            && segments_start_with(self.segments(), other.segments().rev().skip(1).rev())
            && segments_start_with(self.local_segments(), other.local_segments())
    }

    /// Returns a copy of this version with the last numeric component bumped
    /// by one. `1.1l` bumps to `1.2l`; a version without any numeral gains an
    /// epoch of 1.
    pub fn bump(&self) -> Self {
        let mut bumped = self.clone();
        let last_numeral = bumped.components.iter_mut().rev().find_map(|c| match c {
            Component::Numeral(n) => Some(n),
            _ => None,
        });
        match last_numeral {
            Some(n) => *n += 1,
            None => bumped.epoch += 1,
        }
        bumped.norm = bumped.canonical().into_boxed_str();
        bumped
    }

    /// Returns the canonical representation: all segments joined by dots, the
    /// implicit leading `0` of alphabetic segments elided.
    pub fn canonical(&self) -> String {
        fn format_segment(components: &[Component]) -> String {
            // Skip the implicit leading zero in front of a letter run.
            let components = if components.len() > 1
                && components[0] == Component::default()
                && components[1].as_number().is_none()
            {
                &components[1..]
            } else {
                components
            };
            components.iter().join("")
        }

        let mut out = String::new();
        if self.epoch != 0 {
            out.push_str(&format!("{}!", self.epoch));
        }
        out.push_str(&self.segments().map(format_segment).join("."));
        if self.has_local() {
            out.push('+');
            out.push_str(&self.local_segments().map(format_segment).join("."));
        }
        out
    }

    pub(crate) fn from_parts(
        norm: Box<str>,
        epoch: u64,
        components: SmallVec<[Component; 4]>,
        segment_lengths: SmallVec<[u16; 4]>,
        local_start: u16,
    ) -> Self {
        Self {
            norm,
            epoch,
            components,
            segment_lengths,
            local_start,
        }
    }
}

/// Returns true when the segments of `a` start with the segments of `b`,
/// padding missing components with zeros within a segment.
fn segments_start_with<'a, 'b>(
    a: impl Iterator<Item = &'a [Component]>,
    b: impl Iterator<Item = &'b [Component]>,
) -> bool {
    for pair in a.zip_longest(b) {
        let (left, right) = match pair {
            EitherOrBoth::Both(left, right) => (left, right),
            EitherOrBoth::Left(_) => return true,
            EitherOrBoth::Right(_) => return false,
        };
        for components in left.iter().zip_longest(right.iter()) {
            match components {
                EitherOrBoth::Both(a, b) if a != b => return false,
                EitherOrBoth::Both(_, _) => {}
                EitherOrBoth::Left(_) => return true,
                EitherOrBoth::Right(_) => return false,
            }
        }
    }
    true
}

fn cmp_segments<'a, 'b>(
    a: impl Iterator<Item = &'a [Component]>,
    b: impl Iterator<Item = &'b [Component]>,
) -> Ordering {
    let default = Component::default();
    for pair in a.zip_longest(b) {
        let (left, right) = pair.or_default();
        for components in left.iter().zip_longest(right.iter()) {
            let (a_component, b_component) = match components {
                EitherOrBoth::Both(l, r) => (l, r),
                EitherOrBoth::Left(l) => (l, &default),
                EitherOrBoth::Right(r) => (&default, r),
            };
            match a_component.cmp(b_component) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
    }
    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| cmp_segments(self.segments(), other.segments()))
            .then_with(|| cmp_segments(self.local_segments(), other.local_segments()))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        fn hash_segments<'i, H: Hasher>(
            state: &mut H,
            segments: impl Iterator<Item = &'i [Component]>,
        ) {
            // `1.2` and `1.2.0` are equal, so trailing default components and
            // all-default segments must not contribute to the hash.
            let default = Component::default();
            for segment in segments {
                segment
                    .iter()
                    .rev()
                    .skip_while(|c| **c == default)
                    .for_each(|c| c.hash(state));
            }
        }

        self.epoch.hash(state);
        hash_segments(state, self.segments());
        hash_segments(state, self.local_segments());
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.norm)
    }
}

impl Debug for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Version(\"{}\", [", self.norm)?;
        for (i, segment) in self.segments().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[{}]", segment.iter().join(", "))?;
        }
        write!(f, "])")
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.norm)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        source.parse().map_err(serde::de::Error::custom)
    }
}

/// A [`Version`] that additionally considers the number of segments when
/// comparing. Under the regular ordering `1.2.0` equals `1.2`; a
/// `StrictVersion` distinguishes them, which matters for `startswith`
/// constraints where `1.2.0.*` must not collapse into `1.2.*`.
#[derive(Debug, Clone, Eq)]
pub struct StrictVersion(pub Version);

impl PartialEq for StrictVersion {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
            && self.0.segment_lengths == other.0.segment_lengths
            && self.0.local_start == other.0.local_start
    }
}

impl Hash for StrictVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
        self.0.segment_lengths.len().hash(state);
    }
}

impl Ord for StrictVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .cmp(&other.0)
            .then_with(|| self.0.segment_lengths.len().cmp(&other.0.segment_lengths.len()))
    }
}

impl PartialOrd for StrictVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for StrictVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::str::FromStr;

    use rand::seq::SliceRandom;

    use super::{StrictVersion, Version};

    #[test]
    fn conda_ordering_table() {
        // Adjacent pairs annotated with the expected comparison.
        let table = [
            "   0.4",
            "== 0.4.0",
            " < 0.4.1.rc",
            "== 0.4.1.RC",
            " < 0.4.1",
            " < 0.5a1",
            " < 0.5b3",
            " < 0.5C1",
            " < 0.5",
            " < 0.9.6",
            " < 0.960923",
            " < 1.0",
            " < 1.1dev1",
            " < 1.1_",
            " < 1.1a1",
            " < 1.1.0dev1",
            "== 1.1.dev1",
            " < 1.1.a1",
            " < 1.1.0rc1",
            " < 1.1.0",
            "== 1.1",
            " < 1.1.0post1",
            "== 1.1.post1",
            " < 1.1post1",
            " < 1996.07.12",
            " < 1!0.4.1",
            " < 1!3.1.1.6",
            " < 2!0.4.1",
        ];

        let mut previous: Option<Version> = None;
        for entry in table {
            let (op, version) = match entry.trim().split_once(' ') {
                Some((op, version)) => (op, version),
                None => ("", entry.trim()),
            };
            let version: Version = version.parse().unwrap();
            if let Some(previous) = &previous {
                let expected = match op {
                    "<" => Ordering::Less,
                    "==" => Ordering::Equal,
                    _ => unreachable!("unknown operator {op}"),
                };
                assert_eq!(
                    previous.cmp(&version),
                    expected,
                    "{previous} {op} {version}"
                );
            }
            previous = Some(version);
        }
    }

    #[test]
    fn openssl_underscore_convention() {
        let sorted = [
            "1.0.1dev",
            "1.0.1_",
            "1.0.1a",
            "1.0.1b",
            "1.0.1c",
            "1.0.1d",
            "1.0.1r",
            "1.0.1rc",
            "1.0.1rc1",
            "1.0.1rc2",
            "1.0.1s",
            "1.0.1",
            "1.0.2",
        ];
        let parsed: Vec<Version> = sorted.iter().map(|v| v.parse().unwrap()).collect();
        let mut shuffled = parsed.clone();
        shuffled.shuffle(&mut rand::thread_rng());
        shuffled.sort();
        assert_eq!(shuffled, parsed);
    }

    #[test]
    fn pep440_ordering() {
        let sorted = [
            "1.0a1",
            "1.0a2.dev456",
            "1.0a12.dev456",
            "1.0a12",
            "1.0b1.dev456",
            "1.0b2",
            "1.0b2.post345.dev456",
            "1.0b2.post345",
            "1.0c1.dev456",
            "1.0c1",
            "1.0c3",
            "1.0rc2",
            "1.0.dev456",
            "1.0",
            "1.0.post456.dev34",
            "1.0.post456",
            "1.1.dev1",
            "1.2+abc",
            "1.2+abc123def",
            "1.2+abc123",
            "1.2+123abc",
            "1.2+123abc456",
            "1.2+1234.abc",
            "1.2+123456",
            "1!1.0a1",
            "1!1.0",
            "1!1.1.dev1",
        ];
        let parsed: Vec<Version> = sorted.iter().map(|v| v.parse().unwrap()).collect();
        let mut shuffled = parsed.clone();
        shuffled.shuffle(&mut rand::thread_rng());
        shuffled.sort();
        assert_eq!(shuffled, parsed);
    }

    #[test]
    fn epoch_dominates() {
        let a: Version = "1!1.0".parse().unwrap();
        let b: Version = "2.0".parse().unwrap();
        assert!(a > b);
        assert_eq!(a.epoch(), 1);
        assert_eq!(b.epoch(), 0);
    }

    #[test]
    fn starts_with() {
        let v = Version::from_str("1.2.3").unwrap();
        assert!(v.starts_with(&Version::from_str("1.2").unwrap()));
        assert!(v.starts_with(&Version::from_str("1.2.3").unwrap()));
        assert!(!v.starts_with(&Version::from_str("1.3").unwrap()));

        // 2.38 does not start with 2.38.0.1
        let v = Version::from_str("2.38").unwrap();
        assert!(v.starts_with(&Version::from_str("2.38.0").unwrap()));
        assert!(!v.starts_with(&Version::from_str("2.38.0.1").unwrap()));
    }

    #[test]
    fn compatible_with() {
        let spec = Version::from_str("2.4").unwrap();
        assert!(Version::from_str("2.4").unwrap().compatible_with(&spec));
        assert!(Version::from_str("2.5").unwrap().compatible_with(&spec));
        assert!(!Version::from_str("2.1").unwrap().compatible_with(&spec));
        assert!(!Version::from_str("3.1").unwrap().compatible_with(&spec));
    }

    #[test]
    fn bump() {
        assert_eq!(
            Version::from_str("1.1").unwrap().bump(),
            Version::from_str("1.2").unwrap()
        );
        assert_eq!(
            Version::from_str("1.1l").unwrap().bump(),
            Version::from_str("1.2l").unwrap()
        );
    }

    #[test]
    fn as_major_minor() {
        assert_eq!(
            Version::from_str("1.2.3").unwrap().as_major_minor(),
            Some((1, 2))
        );
        assert_eq!(
            Version::from_str("5!1.2.3").unwrap().as_major_minor(),
            Some((1, 2))
        );
        assert_eq!(Version::from_str("1").unwrap().as_major_minor(), None);
        assert_eq!(Version::from_str("1a.2").unwrap().as_major_minor(), None);
    }

    #[test]
    fn canonical() {
        assert_eq!(Version::from_str("1.2.3").unwrap().canonical(), "1.2.3");
        assert_eq!(Version::from_str("1!1.2.3").unwrap().canonical(), "1!1.2.3");
        assert_eq!(
            Version::from_str("1.2.3-alpha.2").unwrap().canonical(),
            "1.2.3.alpha.2"
        );
    }

    fn hash_of(value: &impl Hash) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn hash_consistent_with_eq() {
        let a = Version::from_str("1.2.0").unwrap();
        let b = Version::from_str("1.2").unwrap();
        let c = Version::from_str("1.2.0.0.0").unwrap();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(hash_of(&a), hash_of(&c));

        let with_epoch = Version::from_str("1!1.2.0").unwrap();
        assert_ne!(a, with_epoch);
        assert_ne!(hash_of(&a), hash_of(&with_epoch));
    }

    #[test]
    fn strict_version_distinguishes_segment_count() {
        let a = StrictVersion(Version::from_str("1.2.0").unwrap());
        let b = StrictVersion(Version::from_str("1.2").unwrap());
        assert_ne!(a, b);
        assert_eq!(a, StrictVersion(Version::from_str("1.2.0").unwrap()));
    }

    #[test]
    fn display_preserves_source() {
        for source in ["1.2.3", "1!1.0RC2", "1.0.1_", "4.2+local.3"] {
            let version = Version::from_str(source).unwrap();
            assert_eq!(version.to_string(), source.to_lowercase());
        }
    }
}
