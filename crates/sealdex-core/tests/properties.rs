//! Property-based laws for the indexing pipeline.

use indexmap::IndexMap;
use proptest::prelude::*;
use sealdex_core::{Client, CoreError, DocumentSketch, Indexer, Server};

fn word() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn sketch_from_counts(id: &str, counts: &[(String, u64)]) -> DocumentSketch {
    let mut list = IndexMap::new();
    for (word, count) in counts {
        *list.entry(word.clone()).or_insert(0) += count;
    }
    DocumentSketch {
        id: id.to_string(),
        list,
        size: 200,
    }
}

proptest! {
    /// Splitting the same bytes differently never changes the sketch.
    #[test]
    fn chunking_is_transparent(
        text in "[ a-zA-Z0-9,.!]{0,120}",
        cut_a in 0usize..120,
        cut_b in 0usize..120,
    ) {
        let bytes = text.as_bytes();
        let cut_a = cut_a.min(bytes.len());
        let cut_b = cut_b.min(bytes.len()).max(cut_a);

        let mut whole = Indexer::new("doc");
        whole.push(bytes);

        let mut split = Indexer::new("doc");
        split.push(&bytes[..cut_a]);
        split.push(&bytes[cut_a..cut_b]);
        split.push(&bytes[cut_b..]);

        prop_assert_eq!(whole.finish(), split.finish());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The bucket total depends on `max` alone, never on the content.
    #[test]
    fn padding_hides_content(
        words_a in prop::collection::vec(word(), 1..12),
        words_b in prop::collection::vec(word(), 1..12),
    ) {
        let counts_a: Vec<_> = words_a.into_iter().map(|w| (w, 1)).collect();
        let counts_b: Vec<_> = words_b.into_iter().map(|w| (w, 1)).collect();

        let mut client = Client::new();
        let a = client
            .secure_index("dA", 200, &[sketch_from_counts("doc1", &counts_a)])
            .unwrap();
        let b = client
            .secure_index("dB", 200, &[sketch_from_counts("doc2", &counts_b)])
            .unwrap();

        prop_assert_eq!(a.index.len(), b.index.len());
    }

    /// Every indexed (word, document) pair is found, ranked by true count.
    #[test]
    fn search_finds_indexed_words_in_count_order(
        counts in prop::collection::vec((word(), 1u64..6), 1..10),
        extra in prop::collection::vec((word(), 1u64..6), 0..10),
    ) {
        let doc1 = sketch_from_counts("doc1", &counts);
        let doc2 = sketch_from_counts("doc2", &extra);

        let mut client = Client::new();
        let index = client
            .secure_index("dA", 200, &[doc1.clone(), doc2.clone()])
            .unwrap();
        let mut server = Server::default();
        server.update("dA", index, &[]).unwrap();

        for (word, _) in &counts {
            let hits = server.search(&client.create_query(word)).unwrap();

            let mut expected: Vec<(&str, u64)> = Vec::new();
            for sketch in [&doc1, &doc2] {
                if let Some(count) = sketch.list.get(word) {
                    expected.push((sketch.id.as_str(), *count));
                }
            }
            expected.sort_by(|a, b| b.1.cmp(&a.1));

            prop_assert_eq!(hits.len(), expected.len());
            for (hit, (id, _)) in hits.iter().zip(&expected) {
                prop_assert_eq!(hit.0.as_str(), *id);
            }
            for pair in hits.windows(2) {
                prop_assert!(pair[0].1 >= pair[1].1);
            }
        }
    }

    /// A candidate no larger than any live domain is always blocked without
    /// an acknowledgement, and always admitted with one.
    #[test]
    fn update_growth_rule(first in 1usize..4, second in 1usize..4) {
        let build = |client: &mut Client, domain: &str, docs: usize| {
            let sketches: Vec<_> = (0..docs)
                .map(|n| sketch_from_counts(&format!("{domain}-doc{n}"), &[("alpha".to_string(), 1)]))
                .collect();
            client.secure_index(domain, 200, &sketches).unwrap()
        };

        let mut client = Client::new();
        let mut server = Server::default();
        server.update("d1", build(&mut client, "d1", first), &[]).unwrap();

        let candidate = build(&mut client, "d2", second);
        if second <= first {
            let result = server.update("d2", candidate.clone(), &[]);
            let is_merge_required = matches!(result, Err(CoreError::MergeRequired { .. }));
            prop_assert!(is_merge_required);
            prop_assert!(server.get("d2").is_none());

            server.update("d2", candidate, &["d1"]).unwrap();
        } else {
            server.update("d2", candidate, &[]).unwrap();
            prop_assert!(server.get("d1").is_some());
        }
        prop_assert!(server.get("d2").is_some());
    }
}
