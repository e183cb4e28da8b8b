use std::collections::HashMap;

use sqlx::{Pool, Postgres};
use warp::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use warp::http::Response;

use crate::constants::{SHOPPING_LIST_FILENAME, SHOPPING_LIST_HEADER};
use crate::database::error::Error;
use crate::database::schema::{CartLine, CartRow, Uuid};

/// Raw ingredient lines of every recipe in the user's cart, in insertion
/// order of the recipe-ingredient rows. The same ingredient may appear many
/// times here; grouping happens in [`group_cart_rows`].
pub async fn fetch_cart_rows(user_id: Uuid, pool: &Pool<Postgres>) -> Result<Vec<CartRow>, Error> {
    let rows: Vec<CartRow> = sqlx::query_as(
        "
        SELECT i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM shopping_cart sc
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sc.user_id = $1
        ORDER BY ri.id
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Collapses raw cart rows into one total per (name, measurement_unit)
/// pair. Two ingredients sharing a name but not a unit stay distinct.
/// Groups are emitted in first-seen order of the id-ordered input, so the
/// result is stable across calls for the same underlying data.
pub fn group_cart_rows(rows: Vec<CartRow>) -> Vec<CartLine> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<CartLine> = Vec::new();

    for row in rows {
        let key = (row.name.to_owned(), row.measurement_unit.to_owned());
        match index.get(&key) {
            Some(&at) => groups[at].total_amount += i64::from(row.amount),
            None => {
                index.insert(key, groups.len());
                groups.push(CartLine {
                    name: row.name,
                    measurement_unit: row.measurement_unit,
                    total_amount: i64::from(row.amount),
                });
            }
        }
    }

    groups
}

/// Pure read: repeated calls between writes return identical groups.
pub async fn aggregate_shopping_list(
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Vec<CartLine>, Error> {
    let rows = fetch_cart_rows(user_id, pool).await?;
    Ok(group_cart_rows(rows))
}

/// One header line, then `"<name> <unit> <total>"` per group.
pub fn render_shopping_list(lines: &[CartLine]) -> String {
    let mut content = String::from(SHOPPING_LIST_HEADER);
    content.push('\n');
    for line in lines {
        content.push_str(&format!(
            "{} {} {}\n",
            line.name, line.measurement_unit, line.total_amount
        ));
    }
    content
}

/// Wraps the rendered list as a plain-text file download.
pub fn shopping_list_response(content: String) -> Response<String> {
    Response::builder()
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
        )
        .body(content)
        .unwrap_or_else(|_| Response::new(String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, unit: &str, amount: i32) -> CartRow {
        CartRow {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    #[test]
    fn amounts_sum_within_a_group() {
        // Two recipes both using flour: 200 g + 100 g = 300 g.
        let rows = vec![
            row("Flour", "g", 200),
            row("Sugar", "g", 50),
            row("Flour", "g", 100),
        ];
        let groups = group_cart_rows(rows);
        assert_eq!(
            groups,
            vec![
                CartLine {
                    name: String::from("Flour"),
                    measurement_unit: String::from("g"),
                    total_amount: 300,
                },
                CartLine {
                    name: String::from("Sugar"),
                    measurement_unit: String::from("g"),
                    total_amount: 50,
                },
            ]
        );
    }

    #[test]
    fn same_name_different_unit_stays_distinct() {
        let rows = vec![row("Milk", "ml", 200), row("Milk", "g", 15)];
        let groups = group_cart_rows(rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].measurement_unit, "ml");
        assert_eq!(groups[1].measurement_unit, "g");
    }

    #[test]
    fn grouping_is_deterministic_for_identical_input() {
        let rows = vec![
            row("Flour", "g", 200),
            row("Milk", "ml", 500),
            row("Flour", "g", 100),
        ];
        let first = group_cart_rows(rows.clone());
        let second = group_cart_rows(rows);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_cart_renders_just_the_header() {
        let groups = group_cart_rows(vec![]);
        assert!(groups.is_empty());
        assert_eq!(render_shopping_list(&groups), "Shopping list:\n");
    }

    #[test]
    fn rendering_is_one_line_per_group() {
        let groups = group_cart_rows(vec![row("Flour", "g", 300), row("Eggs", "pcs", 4)]);
        let content = render_shopping_list(&groups);
        assert_eq!(content, "Shopping list:\nFlour g 300\nEggs pcs 4\n");
    }

    #[test]
    fn download_response_is_a_plain_text_attachment() {
        let response = shopping_list_response(String::from("Shopping list:\n"));
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"shopping_list.txt\""
        );
    }
}
