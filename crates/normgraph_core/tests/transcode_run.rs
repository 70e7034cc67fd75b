mod common;

use common::{
    count, graph_snapshot, graph_store, node, node_attribute, node_category, node_value,
    norm_store, source, source_category, tagging,
};
use normgraph_core::encode::{EncodeError, GraphEncoder, NODE_HEAD_FALLBACK_ID};
use normgraph_core::encode::tagging::SpanError;
use normgraph_core::model::taxonomy::{ItemKind, RoleKind};
use normgraph_core::text_codec::shift_back;
use normgraph_core::{
    run_transcode, ActionPlan, ActionPolicy, EntityClass, GraphRepository,
    SqliteGraphRepository, TextCorrector, TranscodeError, TranscodeOptions,
};
use rusqlite::Connection;
use uuid::Uuid;

const NC_ROOT: &str = "a0000000-0000-4000-8000-000000000001";
const NC_CHILD: &str = "a0000000-0000-4000-8000-000000000002";
const NODE_A: &str = "b0000000-0000-4000-8000-00000000000a";
const NODE_B: &str = "b0000000-0000-4000-8000-00000000000b";
const SC: &str = "c0000000-0000-4000-8000-000000000001";
const SRC: &str = "d0000000-0000-4000-8000-000000000001";
const AGE: &str = "e0000000-0000-4000-8000-000000000001";
const CONTENT: &str = "The quick brown fox";

fn seeded_norm() -> Connection {
    let conn = norm_store();
    node_category(&conn, NC_ROOT, None, "People");
    node_category(&conn, NC_CHILD, Some(NC_ROOT), "Teachers");
    node(&conn, NODE_A, Some(NC_CHILD), "Alice", "first");
    node(&conn, NODE_B, Some(NC_ROOT), "Bob", "second");
    node_attribute(&conn, AGE, "Age", "Integer");
    node_value(&conn, NODE_A, AGE, "42");
    source_category(&conn, SC, "Interviews");
    source(&conn, SRC, Some(SC), "Interview 1", CONTENT);
    tagging(
        &conn,
        "f0000000-0000-4000-8000-000000000001",
        SRC,
        Some(NODE_A),
        None,
        "5:9",
    );
    tagging(
        &conn,
        "f0000000-0000-4000-8000-000000000002",
        SRC,
        None,
        Some("note"),
        "11:15",
    );
    conn
}

fn default_options() -> TranscodeOptions {
    TranscodeOptions::default()
}

fn parse(id: String) -> Uuid {
    Uuid::parse_str(&id).unwrap()
}

#[test]
fn top_level_category_is_parented_by_created_head_category() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    run_transcode(&norm, &mut graph, &default_options()).unwrap();

    let parent: String = graph
        .query_row(
            "SELECT Item1_Id FROM Role WHERE TypeId = ?1 AND Item2_Id = ?2;",
            rusqlite::params![RoleKind::ParentChild.code(), NC_ROOT],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(parse(parent), NODE_HEAD_FALLBACK_ID);

    let (kind, system): (i64, i64) = graph
        .query_row(
            "SELECT TypeId, System FROM Item WHERE Id = ?1;",
            [NODE_HEAD_FALLBACK_ID.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(kind, ItemKind::Folder.code());
    assert_eq!(system, 1);

    let child_parent: String = graph
        .query_row(
            "SELECT Item1_Id FROM Role WHERE TypeId = ?1 AND Item2_Id = ?2;",
            rusqlite::params![RoleKind::ParentChild.code(), NC_CHILD],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(parse(child_parent), Uuid::parse_str(NC_ROOT).unwrap());
}

#[test]
fn graph_ids_are_written_upper_case() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    run_transcode(&norm, &mut graph, &default_options()).unwrap();

    let id: String = graph
        .query_row(
            "SELECT Id FROM Item WHERE Name = 'Alice';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(id, NODE_A.to_uppercase());
}

#[test]
fn replace_twice_yields_the_same_rows() {
    let norm = seeded_norm();
    let mut graph = graph_store();

    run_transcode(&norm, &mut graph, &default_options()).unwrap();
    let first = graph_snapshot(&graph);
    let report = run_transcode(&norm, &mut graph, &default_options()).unwrap();
    let second = graph_snapshot(&graph);

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert!(report.class(EntityClass::Nodes).unwrap().deleted > 0);
}

#[test]
fn taggings_split_into_references_and_annotations() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    let report = run_transcode(&norm, &mut graph, &default_options()).unwrap();

    assert_eq!(count(&graph, "SELECT COUNT(*) FROM NodeReference;"), 1);
    assert_eq!(count(&graph, "SELECT COUNT(*) FROM Annotation;"), 1);
    assert_eq!(report.class(EntityClass::Taggings).unwrap().inserted, 1);
    assert_eq!(report.class(EntityClass::Annotations).unwrap().inserted, 1);

    let (start, length): (i64, i64) = graph
        .query_row("SELECT StartX, LengthX FROM NodeReference;", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!((start, length), (5, 5));

    let (item, text): (String, String) = graph
        .query_row("SELECT Item_Id, Text FROM Annotation;", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(parse(item), Uuid::parse_str(SRC).unwrap());
    assert_eq!(text, "note");
}

#[test]
fn source_payload_records_plain_text_length() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    run_transcode(&norm, &mut graph, &default_options()).unwrap();

    let (text, length): (String, i64) = graph
        .query_row("SELECT PlainText, LengthX FROM Source;", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(text, CONTENT);
    assert_eq!(length, 19);

    let membership = count(
        &graph,
        &format!(
            "SELECT COUNT(*) FROM Role WHERE TypeId = {} AND Item1_Id = '{SRC}' AND Item2_Id = '{SC}';",
            RoleKind::CategoryMembership.code()
        ),
    );
    assert_eq!(membership, 1);
}

#[test]
fn node_attributes_become_name_and_value_items() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    run_transcode(&norm, &mut graph, &default_options()).unwrap();

    let names = count(
        &graph,
        &format!(
            "SELECT COUNT(*) FROM Item WHERE TypeId = {} AND Name = 'Age';",
            ItemKind::AttributeName.code()
        ),
    );
    let values = count(
        &graph,
        &format!(
            "SELECT COUNT(*) FROM Item WHERE TypeId = {} AND Name = '42';",
            ItemKind::AttributeValue.code()
        ),
    );
    assert_eq!((names, values), (1, 1));

    let owned = count(
        &graph,
        &format!(
            "SELECT COUNT(*) FROM Role r INNER JOIN Item v ON v.Id = r.Item2_Id
             WHERE r.TypeId = {} AND r.Item1_Id = '{NODE_A}' AND v.Name = '42';",
            RoleKind::AttributeValueToOwner.code()
        ),
    );
    assert_eq!(owned, 1);
}

#[test]
fn project_and_users_are_written() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    run_transcode(&norm, &mut graph, &default_options()).unwrap();

    let title: String = graph
        .query_row("SELECT Title FROM Project;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(title, "Study");

    let (initials, account): (String, String) = graph
        .query_row("SELECT Initials, AccountName FROM UserProfile;", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(initials, "AL");
    assert_eq!(account, "Ada Lovelace");
}

#[test]
fn failing_run_leaves_the_previous_graph_untouched() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    run_transcode(&norm, &mut graph, &default_options()).unwrap();
    let before = graph_snapshot(&graph);

    norm.execute("UPDATE Tagging SET Fragment = '5:99' WHERE Node IS NOT NULL;", [])
        .unwrap();
    let err = run_transcode(&norm, &mut graph, &default_options()).unwrap_err();

    assert!(matches!(
        err,
        TranscodeError::Encode(EncodeError::Span(SpanError::OutOfBounds { .. }))
    ));
    assert_eq!(graph_snapshot(&graph), before);
}

#[test]
fn unresolved_category_aborts_without_writing() {
    let norm = norm_store();
    node(
        &norm,
        NODE_A,
        Some("99999999-0000-4000-8000-000000000000"),
        "Orphan",
        "",
    );
    let mut graph = graph_store();

    let err = run_transcode(&norm, &mut graph, &default_options()).unwrap_err();
    assert!(matches!(
        err,
        TranscodeError::Encode(EncodeError::Unresolved {
            class: EntityClass::Nodes,
            ..
        })
    ));
    assert_eq!(count(&graph, "SELECT COUNT(*) FROM Item;"), 0);
    assert_eq!(count(&graph, "SELECT COUNT(*) FROM Project;"), 0);
}

#[test]
fn skipped_class_is_left_untouched() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    run_transcode(&norm, &mut graph, &default_options()).unwrap();

    norm.execute("DELETE FROM \"User\";", []).unwrap();
    let options = TranscodeOptions {
        plan: ActionPlan::default().with(EntityClass::Users, ActionPolicy::Skip),
        ..TranscodeOptions::default()
    };
    let report = run_transcode(&norm, &mut graph, &options).unwrap();

    assert_eq!(count(&graph, "SELECT COUNT(*) FROM UserProfile;"), 1);
    let users = report.class(EntityClass::Users).unwrap();
    assert_eq!((users.deleted, users.inserted), (0, 0));
}

#[test]
fn text_correction_shifts_free_text_only() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    let options = TranscodeOptions {
        correct_text: true,
        ..TranscodeOptions::default()
    };
    run_transcode(&norm, &mut graph, &options).unwrap();

    let mut expected = "Alice".to_string();
    TextCorrector::new(true).correct("Node.Name", &mut expected).unwrap();
    let stored: String = graph
        .query_row("SELECT Name FROM Item WHERE Id = ?1;", [NODE_A], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, expected);
    assert_eq!(shift_back("Node.Name", &stored).unwrap(), "Alice");

    let text: String = graph
        .query_row("SELECT PlainText FROM Source;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(text, CONTENT);
}

#[test]
fn rebuild_structure_drops_foreign_rows() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    graph
        .execute(
            "INSERT INTO Item (Id, TypeId, Name, Description, CreatedDate, ModifiedDate,
                               CreatedBy, ModifiedBy, System, ReadOnly)
             VALUES ('7E57AAAA-0000-4000-8000-000000000000', 0, 'Leftover', '',
                     '2024-01-01 00:00:00', '2024-01-01 00:00:00', 'X', 'X', 0, 0);",
            [],
        )
        .unwrap();

    let options = TranscodeOptions {
        rebuild_structure: true,
        ..TranscodeOptions::default()
    };
    let report = run_transcode(&norm, &mut graph, &options).unwrap();

    assert!(report.rebuilt);
    assert_eq!(
        count(&graph, "SELECT COUNT(*) FROM Item WHERE Name = 'Leftover';"),
        0
    );
    assert_eq!(count(&graph, "SELECT COUNT(*) FROM Item WHERE Name = 'Alice';"), 1);
}

#[test]
fn project_row_is_updated_in_place() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    run_transcode(&norm, &mut graph, &default_options()).unwrap();

    norm.execute("UPDATE Project SET Title = 'Renamed study';", []).unwrap();
    run_transcode(&norm, &mut graph, &default_options()).unwrap();

    assert_eq!(count(&graph, "SELECT COUNT(*) FROM Project;"), 1);
    let repo = SqliteGraphRepository::try_new(&graph).unwrap();
    let project = repo.load_project().unwrap().unwrap();
    assert_eq!(project.title, "Renamed study");
    assert_eq!(project.description, "Pilot interviews");
    assert_eq!(project.audit.modified_by, Uuid::parse_str(common::USER).unwrap());
}

#[test]
fn family_encoders_reject_classes_of_other_families() {
    let graph = graph_store();
    let repo = SqliteGraphRepository::try_new(&graph).unwrap();
    let mut encoder = GraphEncoder::new(&repo, TextCorrector::new(false));

    assert!(matches!(
        encoder.encode_categories(EntityClass::Nodes, &[]),
        Err(EncodeError::UnsupportedClass {
            class: EntityClass::Nodes,
            ..
        })
    ));
    assert!(matches!(
        encoder.encode_attributes(EntityClass::Taggings, &[]),
        Err(EncodeError::UnsupportedClass {
            class: EntityClass::Taggings,
            ..
        })
    ));
    assert!(encoder
        .encode_categories(EntityClass::SourceCategories, &[])
        .is_ok());
}
