#![allow(dead_code)]

use normgraph_core::db::{open_graph_db_in_memory, open_norm_db_in_memory};
use rusqlite::{params, Connection};

pub const USER: &str = "0c2a5b7e-1111-4c1d-9e2f-000000000001";
pub const AT: &str = "2024-01-02 03:04:05";

pub fn norm_store() -> Connection {
    let conn = open_norm_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO \"User\" (Id, Name) VALUES (?1, 'Ada Lovelace');",
        [USER],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO Project (Version, Title, Description, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate)
         VALUES ('0.2', 'Study', 'Pilot interviews', ?1, ?2, ?1, ?2);",
        params![USER, AT],
    )
    .unwrap();
    conn
}

pub fn graph_store() -> Connection {
    open_graph_db_in_memory().unwrap()
}

pub fn node_category(conn: &Connection, id: &str, parent: Option<&str>, name: &str) {
    conn.execute(
        "INSERT INTO NodeCategory (Id, Parent, Name, Description, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate)
         VALUES (?1, ?2, ?3, '', ?4, ?5, ?4, ?5);",
        params![id, parent, name, USER, AT],
    )
    .unwrap();
}

pub fn source_category(conn: &Connection, id: &str, name: &str) {
    conn.execute(
        "INSERT INTO SourceCategory (Id, Parent, Name, Description, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate)
         VALUES (?1, NULL, ?2, '', ?3, ?4, ?3, ?4);",
        params![id, name, USER, AT],
    )
    .unwrap();
}

pub fn node(conn: &Connection, id: &str, category: Option<&str>, name: &str, description: &str) {
    conn.execute(
        "INSERT INTO Node (Id, Category, Name, Description, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?5, ?6);",
        params![id, category, name, description, USER, AT],
    )
    .unwrap();
}

pub fn source(conn: &Connection, id: &str, category: Option<&str>, name: &str, content: &str) {
    conn.execute(
        "INSERT INTO Source (Id, Category, Name, Description, Content, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate)
         VALUES (?1, ?2, ?3, '', ?4, ?5, ?6, ?5, ?6);",
        params![id, category, name, content, USER, AT],
    )
    .unwrap();
}

pub fn node_attribute(conn: &Connection, id: &str, name: &str, kind: &str) {
    conn.execute(
        "INSERT INTO NodeAttribute (Id, Name, Description, Type, Length, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate)
         VALUES (?1, ?2, '', ?3, 0, ?4, ?5, ?4, ?5);",
        params![id, name, kind, USER, AT],
    )
    .unwrap();
}

pub fn node_value(conn: &Connection, node: &str, attribute: &str, value: &str) {
    conn.execute(
        "INSERT INTO NodeValue (Node, Attribute, Value, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?4, ?5);",
        params![node, attribute, value, USER, AT],
    )
    .unwrap();
}

pub fn tagging(
    conn: &Connection,
    id: &str,
    source: &str,
    node: Option<&str>,
    memo: Option<&str>,
    fragment: &str,
) {
    conn.execute(
        "INSERT INTO Tagging (Id, Source, Node, Memo, Fragment, CreatedBy, CreatedDate, ModifiedBy, ModifiedDate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?6, ?7);",
        params![id, source, node, memo, fragment, USER, AT],
    )
    .unwrap();
}

pub fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

/// Every row of the graph tables as sorted text, for whole-store comparison.
pub fn graph_snapshot(conn: &Connection) -> Vec<String> {
    let queries = [
        "SELECT 'Item', Id, TypeId, Name, Description, System FROM Item",
        "SELECT 'Role', Item1_Id, TypeId, Item2_Id, Tag, '' FROM Role",
        "SELECT 'Source', Item_Id, TypeId, PlainText, LengthX, '' FROM Source",
        "SELECT 'NodeReference', Id, Node_Item_Id, Source_Item_Id, StartX, LengthX FROM NodeReference",
        "SELECT 'Annotation', Id, Item_Id, Text, StartX, LengthX FROM Annotation",
        "SELECT 'UserProfile', Id, Initials, AccountName, '', '' FROM UserProfile",
        "SELECT 'Project', Title, Description, ModifiedBy, '', '' FROM Project",
        "SELECT 'Category', Item_Id, length(Layout), '', '', '' FROM Category",
        "SELECT 'ExtendedItem', Item_Id, length(Properties), '', '', '' FROM ExtendedItem",
    ];
    let mut rows = Vec::new();
    for sql in queries {
        let mut stmt = conn.prepare(sql).unwrap();
        let mapped = stmt
            .query_map([], |row| {
                let mut cells = Vec::new();
                for index in 0..6 {
                    let cell: rusqlite::types::Value = row.get(index)?;
                    cells.push(format!("{cell:?}"));
                }
                Ok(cells.join("|"))
            })
            .unwrap();
        for row in mapped {
            rows.push(row.unwrap());
        }
    }
    rows.sort();
    rows
}
