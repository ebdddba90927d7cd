// Copyright 2023 Remi Bernotavicius

//! Bulk loading of catalog data from JSON files.

use crate::catalog::{self, NewIngredient, NewTag};
use crate::database;
use crate::Result;
use diesel::Connection as _;
use std::path::Path;

mod json;

const BATCH_SIZE: usize = 500;

pub struct IngredientImporter {
    remaining: Vec<NewIngredient>,
    total: usize,
    num_added: usize,
}

impl IngredientImporter {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut remaining: Vec<NewIngredient> = json::decode_records_from_path(path)?;
        // Batches are taken from the back.
        remaining.reverse();
        let total = remaining.len();

        Ok(Self {
            remaining,
            total,
            num_added: 0,
        })
    }

    pub fn done(&self) -> bool {
        self.remaining.is_empty()
    }

    /// How many ingredients were new to the catalog so far.
    pub fn num_added(&self) -> usize {
        self.num_added
    }

    pub fn percent_done(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        (self.total - self.remaining.len()) as f32 / self.total as f32
    }

    pub fn import_one(&mut self, conn: &mut database::Connection) -> Result<()> {
        assert!(!self.done());

        let split_point = self.remaining.len().saturating_sub(BATCH_SIZE);
        let mut batch = self.remaining.split_off(split_point);
        batch.reverse();

        let added = conn.transaction(|conn| catalog::add_ingredients(conn, &batch))?;
        self.num_added += added;
        Ok(())
    }
}

/// Loads every ingredient in the file at `path`, skipping ones already present. Returns how
/// many were added.
pub fn import_ingredients(conn: &mut database::Connection, path: impl AsRef<Path>) -> Result<usize> {
    let mut importer = IngredientImporter::new(path)?;

    while !importer.done() {
        importer.import_one(conn)?;
        log::info!("imported {:.0}%", importer.percent_done() * 100.0);
    }

    log::info!("added {} new ingredients", importer.num_added());
    Ok(importer.num_added())
}

/// Loads every tag in the file at `path`. Tags whose slug already exists are left alone.
pub fn import_tags(conn: &mut database::Connection, path: impl AsRef<Path>) -> Result<usize> {
    let new_tags: Vec<NewTag> = json::decode_records_from_path(path)?;

    let added = conn.transaction(|conn| {
        let mut added = 0;
        for tag in &new_tags {
            if catalog::add_tag(conn, tag)? {
                added += 1;
            } else {
                log::info!("tag {:?} already exists, skipping", tag.slug);
            }
        }
        Ok::<_, crate::error::Error>(added)
    })?;

    log::info!("added {added} new tags");
    Ok(added)
}

#[cfg(test)]
fn write_json(contents: &str) -> tempfile::NamedTempFile {
    use std::io::Write as _;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn import_ingredients_skips_existing() {
    let mut conn = database::establish_in_memory().unwrap();
    let file = write_json(
        r#"[
            {"name": "abricot", "measurement_unit": "g"},
            {"name": "salt", "measurement_unit": "g"},
            {"name": "salt", "measurement_unit": "pinch"}
        ]"#,
    );

    assert_eq!(import_ingredients(&mut conn, file.path()).unwrap(), 3);
    assert_eq!(import_ingredients(&mut conn, file.path()).unwrap(), 0);
    assert_eq!(catalog::search_ingredients(&mut conn, Some("salt")).unwrap().len(), 2);
}

#[test]
fn importer_works_in_batches() {
    let records: Vec<String> = (0..BATCH_SIZE + 3)
        .map(|i| format!(r#"{{"name": "ingredient {i:04}", "measurement_unit": "g"}}"#))
        .collect();
    let file = write_json(&format!("[{}]", records.join(",")));

    let mut conn = database::establish_in_memory().unwrap();
    let mut importer = IngredientImporter::new(file.path()).unwrap();
    assert!(!importer.done());

    importer.import_one(&mut conn).unwrap();
    assert_eq!(importer.num_added(), BATCH_SIZE);
    assert!(importer.percent_done() < 1.0);

    importer.import_one(&mut conn).unwrap();
    assert!(importer.done());
    assert_eq!(importer.num_added(), BATCH_SIZE + 3);
    assert_eq!(importer.percent_done(), 1.0);
}

#[test]
fn bad_ingredient_rolls_back_its_batch() {
    let mut conn = database::establish_in_memory().unwrap();
    let file = write_json(
        r#"[
            {"name": "abricot", "measurement_unit": "g"},
            {"name": "", "measurement_unit": "g"}
        ]"#,
    );
    assert!(import_ingredients(&mut conn, file.path()).is_err());
    assert!(catalog::search_ingredients(&mut conn, None).unwrap().is_empty());
}

#[test]
fn import_tags_skips_known_slugs() {
    let mut conn = database::establish_in_memory().unwrap();
    let file = write_json(
        r##"[
            {"name": "Breakfast", "color": "#E26C2D", "slug": "breakfast"},
            {"name": "Lunch", "color": "#49B64E", "slug": "lunch"}
        ]"##,
    );

    assert_eq!(import_tags(&mut conn, file.path()).unwrap(), 2);
    assert_eq!(import_tags(&mut conn, file.path()).unwrap(), 0);
    assert_eq!(catalog::list_tags(&mut conn).unwrap().len(), 2);
}
