use fmrepo_core::{
    gt, in_set, includes, present, Criteria, Direction, FmError, Model, Predicate, Relation,
    Repository, Value,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn setup() -> (TempDir, Arc<Repository>) {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(Repository::new(dir.path()).unwrap());
    (dir, repo)
}

fn write_doc(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn places(repo: &Arc<Repository>) -> Relation {
    Model::builder("place")
        .scope("_places/**/*.md")
        .bind(Arc::clone(repo))
        .build()
        .relation(Arc::clone(repo))
}

fn seed_places(root: &Path) {
    write_doc(
        root,
        "_places/seattle.md",
        "---\ntitle: Seattle\ncounty: King\nstate: WA\npopulation: 750000\ntags: [city, coastal]\n---\n\nEmerald city.\n",
    );
    write_doc(
        root,
        "_places/bellevue.md",
        "---\ntitle: Bellevue\ncounty: King\nstate: WA\npopulation: 150000\ntags: [city]\n---\n\nEastside.\n",
    );
    write_doc(
        root,
        "_places/tacoma.md",
        "---\ntitle: Tacoma\ncounty: Pierce\nstate: WA\npopulation: 220000\n---\n\nPort.\n",
    );
    write_doc(
        root,
        "_places/or/portland.md",
        "---\ntitle: Portland\ncounty: Multnomah\nstate: OR\npopulation: 650000\ntags: [city, river]\n---\n\nRoses.\n",
    );
}

fn id_set(relation: &Relation) -> BTreeSet<String> {
    relation.ids().unwrap().into_iter().collect()
}

#[test]
fn every_file_in_scope_becomes_one_record() {
    let (dir, repo) = setup();
    for index in 0..5 {
        write_doc(
            dir.path(),
            &format!("_places/p{index}.md"),
            &format!("---\nindex: {index}\n---\n\nBody {index}\n"),
        );
    }
    write_doc(dir.path(), "_places/notes.txt", "not a document");

    let relation = places(&repo);
    assert_eq!(relation.count().unwrap(), 5);
    assert_eq!(relation.to_vec().unwrap().len(), 5);
}

#[test]
fn missing_values_sort_last_ascending_and_first_descending() {
    let (dir, repo) = setup();
    write_doc(dir.path(), "_places/a.md", "---\nrank: 5\n---\n\n");
    write_doc(dir.path(), "_places/b.md", "---\ntitle: unranked\n---\n\n");
    write_doc(dir.path(), "_places/c.md", "---\nrank: 3\n---\n\n");

    let ranks = |direction: Direction| -> Vec<Option<i64>> {
        places(&repo)
            .order("rank", direction)
            .to_vec()
            .unwrap()
            .iter()
            .map(|record| record.get("rank").and_then(Value::as_i64))
            .collect()
    };

    assert_eq!(ranks(Direction::Asc), vec![Some(3), Some(5), None]);
    assert_eq!(ranks(Direction::Desc), vec![None, Some(5), Some(3)]);
}

#[test]
fn chained_filters_equal_a_single_conjunctive_filter() {
    let (dir, repo) = setup();
    seed_places(dir.path());
    let base = places(&repo);

    let chained = base.filter([("county", "King")]).filter([("population", gt(200_000))]);
    let combined = base.filter(
        Criteria::new()
            .eq("county", "King")
            .test("population", gt(200_000)),
    );
    let county: BTreeSet<String> = id_set(&base.filter([("county", "King")]));
    let large: BTreeSet<String> = id_set(&base.filter([("population", gt(200_000))]));
    let intersection: BTreeSet<String> = county.intersection(&large).cloned().collect();

    assert_eq!(id_set(&chained), id_set(&combined));
    assert_eq!(id_set(&chained), intersection);
    assert_eq!(
        chained.ids().unwrap(),
        vec!["_places/seattle.md".to_string()]
    );
}

#[test]
fn chaining_leaves_the_original_relation_untouched() {
    let (dir, repo) = setup();
    seed_places(dir.path());
    let base = places(&repo);

    let narrowed = base.filter([("state", "OR")]).limit(1);
    assert_eq!(narrowed.count().unwrap(), 1);
    assert_eq!(base.count().unwrap(), 4);
}

#[test]
fn multi_key_order_offset_and_limit() {
    let (dir, repo) = setup();
    seed_places(dir.path());

    let ordered = places(&repo)
        .order("state", Direction::Desc)
        .order("population", Direction::Asc);
    let titles: Vec<String> = ordered
        .to_vec()
        .unwrap()
        .iter()
        .map(|record| record.get_str("title").unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Bellevue", "Tacoma", "Seattle", "Portland"]);

    let page: Vec<String> = ordered
        .offset(1)
        .limit(2)
        .to_vec()
        .unwrap()
        .iter()
        .map(|record| record.get_str("title").unwrap().to_string())
        .collect();
    assert_eq!(page, vec!["Tacoma", "Seattle"]);

    assert!(ordered.offset(10).to_vec().unwrap().is_empty());
    assert_eq!(
        ordered.first().unwrap().unwrap().get_str("title"),
        Some("Bellevue")
    );
}

#[test]
fn predicates_and_literals_filter_records() {
    let (dir, repo) = setup();
    seed_places(dir.path());
    let base = places(&repo);

    assert_eq!(base.filter([("tags", includes("coastal"))]).count().unwrap(), 1);
    assert_eq!(base.filter([("tags", present())]).count().unwrap(), 3);
    assert_eq!(
        base.filter([("county", in_set(["King", "Pierce"]))])
            .count()
            .unwrap(),
        3
    );

    let long_title = Predicate::new(|value| {
        value
            .and_then(Value::as_str)
            .is_some_and(|title| title.len() > 7)
    });
    assert_eq!(
        base.filter([("title", long_title)])
            .order("_id", Direction::Asc)
            .ids()
            .unwrap(),
        vec![
            "_places/bellevue.md".to_string(),
            "_places/or/portland.md".to_string()
        ]
    );

    // Absent fields resolve to null.
    assert_eq!(base.filter([("nickname", Value::Null)]).count().unwrap(), 4);
    assert_eq!(base.filter([("nickname", "Jet City")]).count().unwrap(), 0);
}

#[test]
fn null_literal_matches_missing_and_null_fields() {
    let (dir, repo) = setup();
    write_doc(dir.path(), "_places/a.md", "---
title: A
---

");
    write_doc(dir.path(), "_places/b.md", "---
title: B
draft: null
---

");
    write_doc(dir.path(), "_places/c.md", "---
title: C
draft: false
---

");

    let ids = places(&repo)
        .filter(Criteria::new().eq("draft", Value::Null))
        .order("_id", Direction::Asc)
        .ids()
        .unwrap();
    assert_eq!(
        ids,
        vec!["_places/a.md".to_string(), "_places/b.md".to_string()]
    );
}

#[test]
fn numeric_literals_match_integers_and_floats_alike() {
    let (dir, repo) = setup();
    write_doc(dir.path(), "_places/a.md", "---
rating: 5.0
---

");
    write_doc(dir.path(), "_places/b.md", "---
rating: 5
---

");
    write_doc(dir.path(), "_places/c.md", "---
rating: 4.5
---

");

    let ids = places(&repo)
        .filter([("rating", 5)])
        .order("_id", Direction::Asc)
        .ids()
        .unwrap();
    assert_eq!(
        ids,
        vec!["_places/a.md".to_string(), "_places/b.md".to_string()]
    );
    assert_eq!(places(&repo).filter([("rating", 4.5)]).count().unwrap(), 1);
}

#[test]
fn virtual_fields_resolve_before_metadata() {
    let (dir, repo) = setup();
    write_doc(
        dir.path(),
        "_places/shadow.md",
        "---\n_id: fake\n_model: other\n---\n\n",
    );

    let record = places(&repo).first().unwrap().unwrap();
    assert_eq!(record.id().as_deref(), Some("_places/shadow.md"));
    assert_eq!(
        record.field("_id").as_deref(),
        Some(&Value::from("_places/shadow.md"))
    );
    assert_eq!(
        record.field("_rel_path").as_deref(),
        Some(&Value::from("_places/shadow.md"))
    );
    assert_eq!(record.field("_model").as_deref(), Some(&Value::from("place")));
    assert_eq!(
        record.field("_path").as_deref(),
        Some(&Value::from(
            repo.abs("_places/shadow.md").to_string_lossy().into_owned()
        ))
    );
    assert!(record
        .field("_mtime")
        .as_deref()
        .and_then(Value::as_u64)
        .is_some_and(|millis| millis > 0));

    assert_eq!(places(&repo).filter([("_model", "place")]).count().unwrap(), 1);
    assert_eq!(places(&repo).filter([("_id", "fake")]).count().unwrap(), 0);
    assert_eq!(places(&repo).filter([("_mtime", gt(0))]).count().unwrap(), 1);
}

#[test]
fn exclude_patterns_drop_matching_paths() {
    let (dir, repo) = setup();
    write_doc(dir.path(), "docs/guide.md", "---\n---\n\n");
    write_doc(dir.path(), "docs/drafts/wip.md", "---\n---\n\n");
    write_doc(dir.path(), "docs/drafts/deep/older.md", "---\n---\n\n");
    write_doc(dir.path(), "docs/README.md", "---\n---\n\n");

    let model = Model::builder("doc")
        .scope("docs/**/*.md")
        .exclude(["docs/drafts/*", "*/README.md"])
        .build();
    let ids = model
        .relation(Arc::clone(&repo))
        .order("_id", Direction::Asc)
        .ids()
        .unwrap();
    assert_eq!(ids, vec!["docs/guide.md".to_string()]);
}

#[test]
fn hidden_documents_are_outside_every_scope() {
    let (dir, repo) = setup();
    write_doc(dir.path(), "_places/a.md", "---\n---\n\n");
    write_doc(dir.path(), "_places/.hidden.md", "---\n---\n\n");
    write_doc(dir.path(), "_places/.git/x.md", "---\n---\n\n");

    assert_eq!(places(&repo).ids().unwrap(), vec!["_places/a.md".to_string()]);
}

#[test]
fn brace_scopes_select_every_alternative() {
    let (dir, repo) = setup();
    write_doc(dir.path(), "pages/a.md", "---\n---\n\n");
    write_doc(dir.path(), "pages/b.markdown", "---\n---\n\n");
    write_doc(dir.path(), "pages/c.html", "<p>c</p>\n");

    let model = Model::builder("page").scope("pages/*.{md,markdown}").build();
    let ids = model
        .relation(Arc::clone(&repo))
        .order("_id", Direction::Asc)
        .ids()
        .unwrap();
    assert_eq!(ids, vec!["pages/a.md".to_string(), "pages/b.markdown".to_string()]);
}

#[test]
fn find_loads_by_id_and_ignores_filters() {
    let (dir, repo) = setup();
    seed_places(dir.path());
    let oregon = places(&repo).filter([("state", "OR")]);

    let seattle = oregon.find("_places/seattle.md").unwrap();
    assert_eq!(seattle.get_str("title"), Some("Seattle"));
    assert!(seattle.is_persisted());

    assert!(matches!(
        oregon.find("_places/nowhere.md"),
        Err(FmError::NotFound(id)) if id == "_places/nowhere.md"
    ));
    assert!(matches!(oregon.find("_places"), Err(FmError::NotFound(_))));
    assert!(matches!(
        oregon.find("../outside.md"),
        Err(FmError::UnsafePath(_))
    ));
}

#[test]
fn find_by_returns_first_match_or_none() {
    let (dir, repo) = setup();
    seed_places(dir.path());
    let base = places(&repo);

    let tacoma = base.find_by([("title", "Tacoma")]).unwrap().unwrap();
    assert_eq!(tacoma.id().as_deref(), Some("_places/tacoma.md"));
    assert!(base.find_by([("title", "Spokane")]).unwrap().is_none());
}

#[test]
fn mixed_type_ordering_falls_back_to_string_forms() {
    let (dir, repo) = setup();
    write_doc(dir.path(), "_places/a.md", "---\ncode: 10\n---\n\n");
    write_doc(dir.path(), "_places/b.md", "---\ncode: \"9\"\n---\n\n");
    write_doc(dir.path(), "_places/c.md", "---\ncode: true\n---\n\n");
    write_doc(dir.path(), "_places/d.md", "---\ncode: [1, 2]\n---\n\n");

    let ids = places(&repo).order("code", Direction::Asc).ids().unwrap();
    assert_eq!(
        ids,
        vec![
            "_places/d.md".to_string(),
            "_places/a.md".to_string(),
            "_places/b.md".to_string(),
            "_places/c.md".to_string()
        ]
    );
}

#[test]
fn missing_scope_glob_is_a_configuration_error() {
    let (_dir, repo) = setup();
    let model = Model::builder("unscoped").build();

    assert!(matches!(
        model.relation(repo).to_vec(),
        Err(FmError::Configuration(_))
    ));
}

#[test]
fn malformed_documents_surface_parse_errors() {
    let (dir, repo) = setup();
    write_doc(dir.path(), "_places/broken.md", "---\ntitle: [unclosed\n---\n\n");

    assert!(matches!(places(&repo).to_vec(), Err(FmError::Parse(_))));
}

trait PlaceScopes {
    fn in_state(&self, state: &str) -> Relation;
    fn largest_first(&self) -> Relation;
}

impl PlaceScopes for Relation {
    fn in_state(&self, state: &str) -> Relation {
        self.filter([("state", state)])
    }

    fn largest_first(&self) -> Relation {
        self.order("population", Direction::Desc)
    }
}

#[test]
fn extension_traits_compose_with_builtin_chaining() {
    let (dir, repo) = setup();
    seed_places(dir.path());

    let ids = places(&repo).in_state("WA").largest_first().limit(2).ids().unwrap();
    assert_eq!(
        ids,
        vec!["_places/seattle.md".to_string(), "_places/tacoma.md".to_string()]
    );
}
