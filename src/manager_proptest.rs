//! Property-based tests for filter resolution.
//!
//! Catalogs and filters are generated at random; resolution must always
//! behave like a set union kept in catalog order.

#[cfg(test)]
mod proptest_tests {
    use std::collections::HashSet;

    use crate::config::{Config, Project, Repository};
    use crate::manager::{resolve_repositories, Filter};
    use proptest::prelude::*;

    const TAGS: [&str; 4] = ["backend", "frontend", "infra", "docs"];

    /// Builds one repository per entry in `tag_bits` (each bit picks a tag)
    /// and one project per entry in `projects`.
    fn build_catalog(tag_bits: &[u8], projects: &[Vec<usize>]) -> Config {
        let mut config = Config::default();
        for (i, bits) in tag_bits.iter().enumerate() {
            let mut repo = Repository::new(
                format!("repo{}", i),
                format!("https://github.com/acme/repo{}.git", i),
            );
            repo.tags = TAGS
                .iter()
                .enumerate()
                .filter(|(bit, _)| (*bits >> *bit) & 1 == 1)
                .map(|(_, t)| t.to_string())
                .collect();
            config.repositories.push(repo);
        }
        for (p, members) in projects.iter().enumerate() {
            config.projects.push(Project {
                name: format!("proj{}", p),
                repositories: members
                    .iter()
                    .map(|m| format!("repo{}", m % tag_bits.len()))
                    .collect(),
                tags: Vec::new(),
            });
        }
        config
    }

    fn catalog_strategy() -> impl Strategy<Value = (Vec<u8>, Vec<Vec<usize>>)> {
        (
            prop::collection::vec(0u8..16, 1..12),
            prop::collection::vec(prop::collection::vec(0usize..32, 0..6), 0..4),
        )
    }

    proptest! {
        /// Property: resolution never yields the same repository twice
        #[test]
        fn resolution_has_no_duplicates(
            (tag_bits, projects) in catalog_strategy(),
            name_picks in prop::collection::vec(0usize..32, 0..6),
            project_picks in prop::collection::vec(0usize..4, 0..3),
        ) {
            let config = build_catalog(&tag_bits, &projects);
            let filter = Filter {
                names: name_picks.iter().map(|i| format!("repo{}", i % tag_bits.len())).collect(),
                projects: if projects.is_empty() {
                    Vec::new()
                } else {
                    project_picks.iter().map(|p| format!("proj{}", p % projects.len())).collect()
                },
                tags: Vec::new(),
                all: false,
            };

            let repos = resolve_repositories(&filter, &config).unwrap();
            let unique: HashSet<_> = repos.iter().map(|r| r.name.as_str()).collect();
            prop_assert_eq!(unique.len(), repos.len());
        }

        /// Property: resolution keeps catalog order
        #[test]
        fn resolution_preserves_catalog_order(
            (tag_bits, projects) in catalog_strategy(),
            name_picks in prop::collection::vec(0usize..32, 1..6),
        ) {
            let config = build_catalog(&tag_bits, &projects);
            let filter = Filter::names(name_picks.iter().rev().map(|i| format!("repo{}", i % tag_bits.len())));

            let repos = resolve_repositories(&filter, &config).unwrap();
            let positions: Vec<usize> = repos
                .iter()
                .map(|r| config.repositories.iter().position(|c| c.name == r.name).unwrap())
                .collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }

        /// Property: a combined filter selects exactly the union of its parts
        #[test]
        fn combined_filter_is_union_of_parts(
            (tag_bits, projects) in catalog_strategy(),
            name_picks in prop::collection::vec(0usize..32, 0..4),
        ) {
            let config = build_catalog(&tag_bits, &projects);
            // Only tags some repository actually carries
            let tags: Vec<String> = TAGS
                .iter()
                .filter(|t| !config.repositories_by_tag(t).is_empty())
                .take(2)
                .map(|t| t.to_string())
                .collect();
            let names: Vec<String> = name_picks.iter().map(|i| format!("repo{}", i % tag_bits.len())).collect();

            let by_names: HashSet<String> = resolve_repositories(&Filter::names(names.clone()), &config)
                .unwrap()
                .iter()
                .map(|r| r.name.clone())
                .collect();
            let mut expected = if names.is_empty() { HashSet::new() } else { by_names };
            for tag in &tags {
                expected.extend(config.repositories_by_tag(tag).iter().map(|r| r.name.clone()));
            }

            let combined = Filter { names, projects: Vec::new(), tags, all: false };
            let got: HashSet<String> = resolve_repositories(&combined, &config)
                .unwrap()
                .iter()
                .map(|r| r.name.clone())
                .collect();

            if combined.selects_all() {
                prop_assert_eq!(got.len(), config.repositories.len());
            } else {
                prop_assert_eq!(got, expected);
            }
        }
    }
}
