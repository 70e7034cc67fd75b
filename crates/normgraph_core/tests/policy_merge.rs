mod common;

use common::{count, graph_store, node, node_attribute, node_category, node_value, norm_store};
use normgraph_core::encode::EncodeError;
use normgraph_core::model::taxonomy::ItemKind;
use normgraph_core::{
    run_transcode, ActionPlan, ActionPolicy, EntityClass, TranscodeError, TranscodeOptions,
};
use rusqlite::Connection;

const CATEGORY: &str = "a0000000-0000-4000-8000-000000000001";
const NODE_A: &str = "b0000000-0000-4000-8000-00000000000a";
const NODE_B: &str = "b0000000-0000-4000-8000-00000000000b";
const AGE: &str = "e0000000-0000-4000-8000-000000000001";
const SITE: &str = "e0000000-0000-4000-8000-000000000002";

fn seeded_norm() -> Connection {
    let conn = norm_store();
    node_category(&conn, CATEGORY, None, "People");
    node(&conn, NODE_A, Some(CATEGORY), "Alice", "first");
    node(&conn, NODE_B, Some(CATEGORY), "Bob", "second");
    node_attribute(&conn, AGE, "Age", "Integer");
    node_attribute(&conn, SITE, "Site", "Text");
    node_value(&conn, NODE_A, AGE, "42");
    node_value(&conn, NODE_A, SITE, "North");
    node_value(&conn, NODE_B, AGE, "7");
    conn
}

fn only(class: EntityClass, policy: ActionPolicy) -> TranscodeOptions {
    TranscodeOptions {
        plan: ActionPlan::uniform(ActionPolicy::Skip).with(class, policy),
        ..TranscodeOptions::default()
    }
}

fn value_exists(graph: &Connection, value: &str) -> bool {
    count(
        graph,
        &format!(
            "SELECT COUNT(*) FROM Item WHERE TypeId = {} AND Name = '{value}';",
            ItemKind::AttributeValue.code()
        ),
    ) > 0
}

#[test]
fn merge_replaces_matching_nodes_and_keeps_the_rest() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    run_transcode(&norm, &mut graph, &TranscodeOptions::default()).unwrap();

    norm.execute("DELETE FROM Node WHERE Id = ?1;", [NODE_B]).unwrap();
    norm.execute(
        "UPDATE Node SET Description = 'revised' WHERE Id = ?1;",
        [NODE_A],
    )
    .unwrap();

    let report = run_transcode(&norm, &mut graph, &only(EntityClass::Nodes, ActionPolicy::Merge))
        .unwrap();

    // Alice's item and her category membership.
    assert_eq!(report.class(EntityClass::Nodes).unwrap().deleted, 2);
    let description: String = graph
        .query_row(
            "SELECT Description FROM Item WHERE Id = ?1;",
            [NODE_A],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(description, "revised");
    assert_eq!(
        count(&graph, &format!("SELECT COUNT(*) FROM Item WHERE Id = '{NODE_B}';")),
        1
    );
}

#[test]
fn replace_removes_rows_missing_from_the_input() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    run_transcode(&norm, &mut graph, &TranscodeOptions::default()).unwrap();

    norm.execute("DELETE FROM NodeValue WHERE Node = ?1;", [NODE_B]).unwrap();
    run_transcode(
        &norm,
        &mut graph,
        &only(EntityClass::NodeAttributes, ActionPolicy::Replace),
    )
    .unwrap();

    assert!(!value_exists(&graph, "7"));
    assert!(value_exists(&graph, "42"));
}

#[test]
fn merge_attributes_touch_only_named_owner_pairs() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    run_transcode(&norm, &mut graph, &TranscodeOptions::default()).unwrap();

    norm.execute("DELETE FROM NodeValue WHERE Attribute = ?1;", [SITE])
        .unwrap();
    norm.execute(
        "UPDATE NodeValue SET Value = '43' WHERE Node = ?1 AND Attribute = ?2;",
        [NODE_A, AGE],
    )
    .unwrap();

    run_transcode(
        &norm,
        &mut graph,
        &only(EntityClass::NodeAttributes, ActionPolicy::Merge),
    )
    .unwrap();

    assert!(value_exists(&graph, "43"));
    assert!(!value_exists(&graph, "42"));
    assert!(value_exists(&graph, "North"));
    assert!(value_exists(&graph, "7"));
    assert_eq!(
        count(
            &graph,
            &format!(
                "SELECT COUNT(*) FROM Item WHERE TypeId = {} AND Name = 'Site';",
                ItemKind::AttributeName.code()
            ),
        ),
        1
    );
}

#[test]
fn merge_needs_a_name_or_id_for_every_row() {
    let norm = norm_store();
    norm.execute(
        "INSERT INTO NodeCategory (Id, Parent, Name, Description, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate)
         VALUES (NULL, NULL, '  ', '', ?1, ?2, ?1, ?2);",
        [common::USER, common::AT],
    )
    .unwrap();
    let mut graph = graph_store();

    let err = run_transcode(
        &norm,
        &mut graph,
        &only(EntityClass::NodeCategories, ActionPolicy::Merge),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TranscodeError::Encode(EncodeError::MissingMergeKey { row: 0, .. })
    ));
}

#[test]
fn rows_without_ids_converge_across_runs() {
    let norm = norm_store();
    norm.execute(
        "INSERT INTO Node (Id, Category, Name, Description, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate)
         VALUES (NULL, NULL, 'Loose', '', ?1, ?2, ?1, ?2);",
        [common::USER, common::AT],
    )
    .unwrap();
    let mut graph = graph_store();

    run_transcode(&norm, &mut graph, &TranscodeOptions::default()).unwrap();
    run_transcode(&norm, &mut graph, &TranscodeOptions::default()).unwrap();

    assert_eq!(
        count(&graph, "SELECT COUNT(*) FROM Item WHERE Name = 'Loose';"),
        1
    );
}

#[test]
fn replace_run_after_removing_an_owner_drops_its_values() {
    let norm = seeded_norm();
    let mut graph = graph_store();
    run_transcode(&norm, &mut graph, &TranscodeOptions::default()).unwrap();

    norm.execute("DELETE FROM NodeValue WHERE Node = ?1;", [NODE_B]).unwrap();
    norm.execute("DELETE FROM Node WHERE Id = ?1;", [NODE_B]).unwrap();
    run_transcode(&norm, &mut graph, &TranscodeOptions::default()).unwrap();

    assert!(!value_exists(&graph, "7"));
    assert!(value_exists(&graph, "42"));
    assert_eq!(
        count(&graph, &format!("SELECT COUNT(*) FROM Item WHERE Id = '{NODE_B}';")),
        0
    );
    assert_eq!(
        count(
            &graph,
            &format!("SELECT COUNT(*) FROM Role WHERE Item1_Id = '{NODE_B}' OR Item2_Id = '{NODE_B}';")
        ),
        0
    );
}
