use crate::db::{models::Tag, DbPool};
use crate::error::Result;
use sqlx::SqliteConnection;
use std::collections::HashMap;

/// Get or create a tag by name
pub async fn get_or_create_tag(conn: &mut SqliteConnection, name: &str) -> Result<Tag> {
    // Normalize tag name (lowercase, trim)
    let normalized = name.trim().to_lowercase();

    let existing = sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE name = ?")
        .bind(&normalized)
        .fetch_optional(&mut *conn)
        .await?;

    if let Some(tag) = existing {
        Ok(tag)
    } else {
        let tag = sqlx::query_as::<_, Tag>("INSERT INTO tags (name) VALUES (?) RETURNING *")
            .bind(&normalized)
            .fetch_one(&mut *conn)
            .await?;

        Ok(tag)
    }
}

/// Attach tags to a question, creating missing tags
pub async fn add_question_tags(
    conn: &mut SqliteConnection,
    question_id: i64,
    tag_names: &[String],
) -> Result<()> {
    for tag_name in tag_names {
        let tag = get_or_create_tag(conn, tag_name).await?;
        sqlx::query("INSERT OR IGNORE INTO question_tags (question_id, tag_id) VALUES (?, ?)")
            .bind(question_id)
            .bind(tag.id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Find a tag by its (normalized) name
pub async fn get_tag_by_name(pool: &DbPool, name: &str) -> Result<Option<Tag>> {
    let tag = sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    Ok(tag)
}

/// Get tag names for a question
pub async fn get_tags_for_question(pool: &DbPool, question_id: i64) -> Result<Vec<String>> {
    let tags: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT t.name
        FROM tags t
        JOIN question_tags qt ON qt.tag_id = t.id
        WHERE qt.question_id = ?
        ORDER BY t.name
        "#,
    )
    .bind(question_id)
    .fetch_all(pool)
    .await?;

    Ok(tags)
}

/// Get tags for multiple questions in a single query (batch loading to avoid N+1)
pub async fn get_tags_for_questions(
    pool: &DbPool,
    question_ids: &[i64],
) -> Result<HashMap<i64, Vec<String>>> {
    if question_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = question_ids
        .iter()
        .enumerate()
        .map(|(i, _)| format!("?{}", i + 1))
        .collect::<Vec<_>>()
        .join(",");

    let query_str = format!(
        r#"
        SELECT qt.question_id, t.name
        FROM question_tags qt
        JOIN tags t ON qt.tag_id = t.id
        WHERE qt.question_id IN ({placeholders})
        ORDER BY qt.question_id, t.name
        "#
    );

    let mut query = sqlx::query_as::<_, (i64, String)>(&query_str);
    for id in question_ids {
        query = query.bind(id);
    }

    let results: Vec<(i64, String)> = query.fetch_all(pool).await?;

    let mut tags_map: HashMap<i64, Vec<String>> = HashMap::new();
    for (question_id, tag_name) in results {
        tags_map.entry(question_id).or_default().push(tag_name);
    }

    // Ensure all question ids have an entry (even if empty)
    for &question_id in question_ids {
        tags_map.entry(question_id).or_default();
    }

    Ok(tags_map)
}

/// Count total tags
pub async fn count_tags(pool: &DbPool) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags")
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{questions, testing};

    #[tokio::test]
    async fn test_tags_are_shared_and_normalized() {
        let pool = testing::pool().await;
        let bob = testing::user(&pool, "bob").await;

        {
            let mut conn = pool.acquire().await.unwrap();
            get_or_create_tag(&mut conn, "tag1").await.unwrap();
        }

        let q = questions::create_question(
            &pool,
            &testing::new_question("Q?", bob.id, &["tag1", " Tag2 "]),
        )
        .await
        .unwrap();

        // tag1 reused, tag2 created
        assert_eq!(count_tags(&pool).await.unwrap(), 2);
        assert_eq!(
            get_tags_for_question(&pool, q.id).await.unwrap(),
            vec!["tag1".to_string(), "tag2".to_string()]
        );
        assert!(get_tag_by_name(&pool, "tag2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_batch_tags_include_untagged_questions() {
        let pool = testing::pool().await;
        let bob = testing::user(&pool, "bob").await;

        let tagged = questions::create_question(&pool, &testing::new_question("A", bob.id, &["rust"]))
            .await
            .unwrap();
        let untagged = questions::create_question(&pool, &testing::new_question("B", bob.id, &[]))
            .await
            .unwrap();

        let map = get_tags_for_questions(&pool, &[tagged.id, untagged.id])
            .await
            .unwrap();
        assert_eq!(map[&tagged.id], vec!["rust".to_string()]);
        assert!(map[&untagged.id].is_empty());
        assert!(get_tags_for_questions(&pool, &[]).await.unwrap().is_empty());
    }
}
