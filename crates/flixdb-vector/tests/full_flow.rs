use flixdb_core::traits::VectorStore;
use flixdb_core::types::{Document, Filter};
use flixdb_vector::FlatIndex;
use tempfile::TempDir;

fn movie(id: &str, v: Vec<f32>, genre: &str, rating: f64) -> Document {
    Document::new(id, id, "plot").with_embedding(v).with_tag("genre", genre).with_numeric("rating", rating)
}

fn corpus() -> Vec<Document> {
    vec![
        movie("movie:1", vec![1.0, 0.0, 0.0], "romance", 7.5),
        movie("movie:2", vec![0.8, 0.2, 0.0], "romance", 6.0),
        movie("movie:3", vec![0.0, 1.0, 0.0], "thriller", 8.8),
        movie("movie:4", vec![0.0, 0.0, 1.0], "romance", 9.1),
    ]
}

#[tokio::test]
async fn filtered_knn_applies_all_predicates_before_ranking() {
    let idx = FlatIndex::new(3);
    idx.upsert(&corpus()).await.unwrap();

    let filter = Filter::none().tag_eq("genre", "romance").num_gte("rating", 7.0);
    let hits = idx.knn(&[1.0, 0.0, 0.0], 5, &filter).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.document.id.as_str()).collect();
    assert_eq!(ids, vec!["movie:1", "movie:4"]);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

    let none = idx.knn(&[1.0, 0.0, 0.0], 5, &Filter::none().tag_eq("genre", "western")).await.unwrap();
    assert!(none.is_empty());

    let capped = idx.knn(&[1.0, 0.0, 0.0], 5, &Filter::none().num_lte("rating", 7.5)).await.unwrap();
    assert_eq!(capped.len(), 2);
}

#[tokio::test]
async fn upsert_replaces_by_id_and_distances_cover_requested_ids() {
    let idx = FlatIndex::new(3);
    idx.upsert(&corpus()).await.unwrap();
    idx.upsert(&[movie("movie:3", vec![1.0, 0.0, 0.0], "thriller", 8.8)]).await.unwrap();
    assert_eq!(idx.count().await.unwrap(), 4);

    let ids = vec!["movie:3".to_string(), "missing".to_string()];
    let d = idx.distances(&[1.0, 0.0, 0.0], &ids).await.unwrap();
    assert_eq!(d.len(), 1);
    assert!(d["movie:3"].abs() < 1e-6);

    let fetched = idx.fetch(&ids).await.unwrap();
    assert_eq!(fetched.len(), 1);
}

#[tokio::test]
async fn snapshot_persists_across_open() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("movies.vectors.json");
    {
        let idx = FlatIndex::open(&path, 3).unwrap();
        idx.upsert(&corpus()).await.unwrap();
    }
    let idx = FlatIndex::open(&path, 3).unwrap();
    assert_eq!(idx.count().await.unwrap(), 4);
    idx.clear().await.unwrap();
    let idx = FlatIndex::open(&path, 3).unwrap();
    assert_eq!(idx.count().await.unwrap(), 0);
}
