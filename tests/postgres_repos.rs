use sqlx::PgPool;
use teebox::application::repos::{
    InventoryQueryFilter, InventoryRepo, PagesRepo, PostsRepo, ReviewsRepo,
};
use teebox::domain::types::{Condition, Locale, PageKind};
use teebox::infra::db::PostgresRepositories;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

async fn insert_item(
    pool: &PgPool,
    brand: &str,
    category: &str,
    age_minutes: i64,
    is_available: bool,
    is_sold: bool,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO inventory_items \
         (id, slug, brand, model, category, price_cents, condition, gender, \
          is_available, is_sold, created_at) \
         VALUES ($1, $2, $3, 'Tour', $4, 12000, $5, 'M', $6, $7, $8)",
    )
    .bind(id)
    .bind(format!("{brand}-{category}-{id}").to_lowercase())
    .bind(brand)
    .bind(category)
    .bind(Condition::Good)
    .bind(is_available)
    .bind(is_sold)
    .bind(OffsetDateTime::now_utc() - Duration::minutes(age_minutes))
    .execute(pool)
    .await
    .expect("insert inventory item");
    id
}

async fn insert_post(
    pool: &PgPool,
    locale: Locale,
    slug: &str,
    published_at: Option<OffsetDateTime>,
) {
    sqlx::query(
        "INSERT INTO posts (id, locale, slug, title, body_markdown, published_at) \
         VALUES ($1, $2, $3, $3, 'body', $4)",
    )
    .bind(Uuid::new_v4())
    .bind(locale)
    .bind(slug)
    .bind(published_at)
    .execute(pool)
    .await
    .expect("insert post");
}

#[sqlx::test(migrations = "./migrations")]
async fn listings_hide_unavailable_and_sold_items(pool: PgPool) {
    let newest = insert_item(&pool, "Titleist", "Driver", 1, true, false).await;
    let older = insert_item(&pool, "Ping", "Putter", 30, true, false).await;
    insert_item(&pool, "Titleist", "Driver", 5, true, true).await;
    insert_item(&pool, "Titleist", "Driver", 6, false, false).await;

    let repos = PostgresRepositories::new(pool);
    let listed = repos
        .list_available(&InventoryQueryFilter::default(), 10)
        .await
        .expect("list inventory");

    let ids: Vec<Uuid> = listed.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![newest, older]);
}

#[sqlx::test(migrations = "./migrations")]
async fn listing_filters_ignore_case(pool: PgPool) {
    let driver = insert_item(&pool, "Titleist", "Driver", 1, true, false).await;
    insert_item(&pool, "Titleist", "Iron", 2, true, false).await;
    insert_item(&pool, "Callaway", "Driver", 3, true, false).await;

    let repos = PostgresRepositories::new(pool);
    let filter = InventoryQueryFilter {
        brand: Some("TITLEIST".to_string()),
        category: Some("driver".to_string()),
    };
    let listed = repos.list_available(&filter, 10).await.expect("filter");

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, driver);
}

#[sqlx::test(migrations = "./migrations")]
async fn related_pool_excludes_reference_and_respects_limit(pool: PgPool) {
    let reference = insert_item(&pool, "Titleist", "Driver", 0, true, false).await;
    for minutes in 1..=5 {
        insert_item(&pool, "Ping", "Wedge", minutes, true, false).await;
    }

    let repos = PostgresRepositories::new(pool);
    let pool_items = repos
        .list_available_excluding(reference, 3)
        .await
        .expect("related pool");

    assert_eq!(pool_items.len(), 3);
    assert!(pool_items.iter().all(|item| item.id != reference));

    let found = repos.find_by_id(reference).await.expect("find");
    assert_eq!(found.map(|item| item.brand), Some("Titleist".to_string()));
    assert!(repos.find_by_id(Uuid::new_v4()).await.expect("find").is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn posts_are_published_per_locale_newest_first(pool: PgPool) {
    let now = OffsetDateTime::now_utc();
    insert_post(&pool, Locale::En, "older", Some(now - Duration::days(3))).await;
    insert_post(&pool, Locale::En, "newer", Some(now - Duration::days(1))).await;
    insert_post(&pool, Locale::En, "draft", None).await;
    insert_post(&pool, Locale::En, "scheduled", Some(now + Duration::days(2))).await;
    insert_post(&pool, Locale::Es, "nuevo", Some(now - Duration::hours(1))).await;

    let repos = PostgresRepositories::new(pool);
    let posts = PostsRepo::list_published(&repos, Locale::En, 10)
        .await
        .expect("list posts");
    let slugs: Vec<&str> = posts.iter().map(|post| post.slug.as_str()).collect();
    assert_eq!(slugs, vec!["newer", "older"]);

    assert!(
        PostsRepo::find_published_by_slug(&repos, Locale::En, "draft")
            .await
            .expect("lookup")
            .is_none()
    );
    assert!(
        PostsRepo::find_published_by_slug(&repos, Locale::Es, "nuevo")
            .await
            .expect("lookup")
            .is_some()
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn location_pages_and_reviews_are_scoped(pool: PgPool) {
    sqlx::query(
        "INSERT INTO pages (id, kind, locale, slug, title, body_markdown, city, published_at) \
         VALUES ($1, $2, $3, 'downtown', 'Downtown', 'bays', 'Springfield', now())",
    )
    .bind(Uuid::new_v4())
    .bind(PageKind::Location)
    .bind(Locale::En)
    .execute(&pool)
    .await
    .expect("insert page");

    for (author, published) in [("Ana", true), ("Ben", false)] {
        sqlx::query(
            "INSERT INTO reviews (id, locale, author, rating, body, is_published) \
             VALUES ($1, $2, $3, 5, 'great', $4)",
        )
        .bind(Uuid::new_v4())
        .bind(Locale::En)
        .bind(author)
        .bind(published)
        .execute(&pool)
        .await
        .expect("insert review");
    }

    let repos = PostgresRepositories::new(pool);
    let pages = PagesRepo::list_published(&repos, PageKind::Location, Locale::En)
        .await
        .expect("pages");
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].city.as_deref(), Some("Springfield"));
    assert!(
        PagesRepo::list_published(&repos, PageKind::Seo, Locale::En)
            .await
            .expect("pages")
            .is_empty()
    );

    let reviews = ReviewsRepo::list_published(&repos, Locale::En)
        .await
        .expect("reviews");
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].author, "Ana");
}
