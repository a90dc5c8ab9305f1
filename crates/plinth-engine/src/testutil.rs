//! Shared fixtures for engine tests.

use rusqlite::Connection;
use tempfile::NamedTempFile;

use plinth_types::DatabaseImage;

/// Small database image with a populated `sites` table.
pub(crate) fn fixture_image() -> DatabaseImage {
    let staging = NamedTempFile::new().unwrap();
    let conn = Connection::open(staging.path()).unwrap();
    conn.execute_batch(
        "CREATE TABLE sites (
             id INTEGER PRIMARY KEY,
             title TEXT NOT NULL,
             category TEXT,
             region TEXT,
             year INTEGER,
             architect TEXT,
             latitude REAL,
             longitude REAL
         );
         INSERT INTO sites VALUES
             (1, 'Villa Savoye', 'Residence', 'Île-de-France', 1931,
              'Le Corbusier', 48.924, 2.028),
             (2, 'Fallingwater', 'Residence', 'Pennsylvania', 1939,
              'Frank Lloyd Wright', 39.906, -79.468),
             (3, 'Sydney Opera House', 'Theatre', 'New South Wales', 1973,
              'Jørn Utzon', -33.857, 151.215),
             (4, 'Bauhaus Dessau', 'School', 'Saxony-Anhalt', 1926,
              'Walter Gropius', 51.839, 12.226),
             (5, 'Barcelona Pavilion', 'Pavilion', 'Catalonia', 1929,
              'Ludwig Mies van der Rohe', 41.370, 2.150);",
    )
    .unwrap();
    drop(conn);
    DatabaseImage::new(std::fs::read(staging.path()).unwrap())
}
