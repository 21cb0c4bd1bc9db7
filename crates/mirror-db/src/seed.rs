//! # Test Row Seeding
//!
//! Inserts a fixed set of queued rows into a queue table so an installation
//! can be exercised end to end before a real producer is wired in.
//!
//! ## Generated Rows
//! - TX (agent → hub): master data messages, one per type in [`TX_TEST_ROWS`]
//! - RX (hub → agent): shop-floor messages, one per type in [`RX_TEST_ROWS`]
//!
//! Every row is status `Q`, version `1`, with a small XML document as payload.

use tracing::info;

use mirror_core::{NewRow, Queue};

use crate::error::DbResult;
use crate::pool::Database;

/// System id used as SOURCE of TX rows and DESTINATION of RX rows.
pub const LOCAL_SYSTEM: &str = "ERP";

/// System id on the hub side.
pub const HUB_SYSTEM: &str = "HUB";

/// TX test messages: (type, payload).
pub const TX_TEST_ROWS: &[(&str, &str)] = &[
    (
        "MATERIAL$POST",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <NAME>INTEGRATION TEST MATERIAL</NAME>
  <MATERIAL_CODE>MAT-TEST</MATERIAL_CODE>
  <DESCRIPTION>Material created by the seeding task</DESCRIPTION>
  <KIND>RAW_MATERIAL</KIND>
  <FAMILY>TEST FAMILY</FAMILY>
  <UNIT>KG</UNIT>
  <GROSS_UNIT_WEIGHT>123.45</GROSS_UNIT_WEIGHT>
  <NET_UNIT_WEIGHT>678.90</NET_UNIT_WEIGHT>
  <TRACKING>LOT</TRACKING>
  <SHELF_LIFE_MONTHS>12</SHELF_LIFE_MONTHS>
</root>"#,
    ),
    (
        "PRODUCT_STRUCTURE_COMPONENT$POST",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <MATERIAL_CODE>MAT-TEST</MATERIAL_CODE>
  <PARENT_MATERIAL_CODE>MAT-TEST-PARENT</PARENT_MATERIAL_CODE>
  <QUANTITY>987.65</QUANTITY>
  <QUANTITY_WITH_LOSS>432.10</QUANTITY_WITH_LOSS>
  <ACTIVE>YES</ACTIVE>
</root>"#,
    ),
    (
        "LOCATION$POST",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <NAME>INTEGRATION TEST LOCATION</NAME>
  <WAREHOUSE_CODE>LOC-TEST</WAREHOUSE_CODE>
  <DESCRIPTION>Location created by the seeding task</DESCRIPTION>
</root>"#,
    ),
    (
        "INVENTORY$POST",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <MATERIAL_CODE>MAT-TEST</MATERIAL_CODE>
  <WAREHOUSE_CODE>LOC-TEST</WAREHOUSE_CODE>
  <BALANCE>123.45</BALANCE>
  <LOT>LABC123</LOT>
  <EXPIRY_DATE>2024-01-01</EXPIRY_DATE>
</root>"#,
    ),
    (
        "PRODUCTION_ORDER_CODE$POST",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <CODE>OP00001</CODE>
  <EXTERNAL_CODE>123456</EXTERNAL_CODE>
</root>"#,
    ),
];

/// RX test messages: (type, payload).
pub const RX_TEST_ROWS: &[(&str, &str)] = &[
    (
        "PRODUCTION_ORDER$POST",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <CODE>OP00001</CODE>
  <MATERIAL_CODE>MAT-TEST</MATERIAL_CODE>
  <QUANTITY>10</QUANTITY>
</root>"#,
    ),
    (
        "PRODUCTION_REPORT$POST",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <CODE>OP00001</CODE>
  <PRODUCED_QUANTITY>8</PRODUCED_QUANTITY>
  <SCRAP_QUANTITY>2</SCRAP_QUANTITY>
</root>"#,
    ),
    (
        "CONSUMPTION$POST",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <CODE>OP00001</CODE>
  <MATERIAL_CODE>MAT-TEST</MATERIAL_CODE>
  <WAREHOUSE_CODE>LOC-TEST</WAREHOUSE_CODE>
  <QUANTITY>4.5</QUANTITY>
</root>"#,
    ),
];

/// Builds the test rows for one queue.
pub fn test_rows(queue: Queue) -> Vec<NewRow> {
    let (source, destination, rows) = match queue {
        Queue::Tx => (LOCAL_SYSTEM, HUB_SYSTEM, TX_TEST_ROWS),
        Queue::Rx => (HUB_SYSTEM, LOCAL_SYSTEM, RX_TEST_ROWS),
    };

    rows.iter()
        .map(|(row_type, data)| NewRow {
            source: source.to_string(),
            destination: destination.to_string(),
            row_type: row_type.to_string(),
            version: "1".to_string(),
            data: Some(data.to_string()),
            remote_id: None,
        })
        .collect()
}

/// Inserts the test rows for `queue` one by one and returns their ids.
///
/// Rows inserted before a failing statement are kept.
pub async fn insert_test_rows(db: &Database, queue: Queue) -> DbResult<Vec<i64>> {
    let repo = db.queue(queue);
    let mut ids = Vec::new();

    for row in test_rows(queue) {
        let id = repo.insert_row(&row).await?;
        info!(table = %repo.table(), row_id = id, row_type = %row.row_type, "Test row inserted");
        ids.push(id);
    }

    Ok(ids)
}
