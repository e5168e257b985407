//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    use crate::core::package::Package;
    use crate::core::version::VersionRecord;

    /// Generate a valid package name (lowercase alphanumeric with hyphens)
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,30}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate one version segment: a digit run (possibly zero-padded) or a letter run
    pub fn version_segment() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u32..30).prop_map(|n| n.to_string()),
            (0u32..10).prop_map(|n| format!("0{n}")),
            prop_oneof![Just("a"), Just("b"), Just("rc"), Just("beta"), Just("pre")]
                .prop_map(str::to_string),
        ]
    }

    /// Generate the version part of a record
    ///
    /// Segments are joined by separator runs of varying length and kind, or
    /// by nothing (`1a2b`); some strings end in separators.
    pub fn version_string() -> impl Strategy<Value = String> {
        let separator = prop_oneof![
            Just(""),
            Just("."),
            Just(".."),
            Just("_"),
            Just("+"),
            Just("._"),
        ];
        let trailing = prop_oneof![4 => Just(""), 1 => Just("."), 1 => Just("_"), 1 => Just("..")];
        (
            version_segment(),
            prop::collection::vec((separator, version_segment()), 0..4),
            trailing,
        )
            .prop_map(|(first, rest, trailing)| {
                let mut version = first;
                for (separator, segment) in rest {
                    version.push_str(separator);
                    version.push_str(&segment);
                }
                version.push_str(trailing);
                version
            })
    }

    /// Generate a raw version string as found in listings and definitions
    ///
    /// The epoch uses either `:` or the legacy `~` separator.
    pub fn raw_version() -> impl Strategy<Value = String> {
        (
            prop::option::of((0u64..3, prop_oneof![Just(':'), Just('~')])),
            version_string(),
            prop::option::of(1u32..5),
        )
            .prop_map(|(epoch, version, release)| {
                let mut raw = String::new();
                if let Some((epoch, separator)) = epoch {
                    raw.push_str(&format!("{epoch}{separator}"));
                }
                raw.push_str(&version);
                if let Some(release) = release {
                    raw.push_str(&format!("-{release}"));
                }
                raw
            })
    }

    /// Generate a version record
    pub fn version_record() -> impl Strategy<Value = VersionRecord> {
        (0u64..3, version_string(), 1u32..5)
            .prop_map(|(epoch, version, release)| VersionRecord::new(epoch, version, release))
    }

    /// Generate an acyclic package set
    ///
    /// Package `pN` may only depend on packages with a smaller index, so
    /// every generated set has at least one valid build order.
    pub fn acyclic_packages() -> impl Strategy<Value = Vec<Package>> {
        (1usize..12).prop_flat_map(|count| {
            prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 0..4), count)
                .prop_map(move |picks| {
                    picks
                        .into_iter()
                        .enumerate()
                        .map(|(i, deps)| {
                            let mut depends: Vec<String> = if i == 0 {
                                Vec::new()
                            } else {
                                deps.iter().map(|d| format!("p{}", d.index(i))).collect()
                            };
                            depends.sort();
                            depends.dedup();
                            Package::new(format!("p{i}"), VersionRecord::new(0, "1.0", 1))
                                .with_depends(depends)
                        })
                        .collect()
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_package_name_generator(name in package_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn test_version_string_generator_parses(version in version_string()) {
            prop_assert!(crate::core::version::VersionRecord::parse(&version).is_ok());
        }

        #[test]
        fn test_raw_version_generator_parses(raw in raw_version()) {
            prop_assert!(crate::core::version::VersionRecord::parse(&raw).is_ok());
        }

        #[test]
        fn test_acyclic_packages_only_point_backwards(packages in acyclic_packages()) {
            for (i, package) in packages.iter().enumerate() {
                for dep in &package.depends {
                    let index: usize = dep.trim_start_matches('p').parse().unwrap();
                    prop_assert!(index < i);
                }
            }
        }
    }
}
