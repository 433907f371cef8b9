use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::application::error::HttpError;
use crate::application::repos::ReviewsRepo;
use crate::domain::entities::ReviewRecord;
use crate::domain::types::Locale;
use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::reviews::ReviewService";

pub const DEFAULT_SAMPLE_SIZE: usize = 3;
pub const MAX_SAMPLE_SIZE: usize = 12;

/// Random selection of published reviews for the home page.
///
/// The RNG is owned by the service so tests can seed it.
pub struct ReviewService {
    reviews: Arc<dyn ReviewsRepo>,
    rng: Mutex<StdRng>,
}

impl ReviewService {
    pub fn new(reviews: Arc<dyn ReviewsRepo>) -> Self {
        Self::with_rng(reviews, StdRng::from_os_rng())
    }

    pub fn with_rng(reviews: Arc<dyn ReviewsRepo>, rng: StdRng) -> Self {
        Self {
            reviews,
            rng: Mutex::new(rng),
        }
    }

    pub async fn sample(&self, locale: Locale, count: usize) -> Result<Vec<ReviewRecord>, HttpError> {
        let reviews = self.reviews.list_published(locale).await.map_err(|err| {
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load reviews",
                format!("list_reviews failed: {err}"),
            )
        })?;

        let mut rng = mutex_lock(&self.rng, SOURCE, "sample");
        Ok(sample_reviews(reviews, count.min(MAX_SAMPLE_SIZE), &mut *rng))
    }
}

/// Uniformly pick `count` reviews (partial Fisher–Yates), in shuffled order.
pub fn sample_reviews<R: rand::Rng + ?Sized>(
    mut reviews: Vec<ReviewRecord>,
    count: usize,
    rng: &mut R,
) -> Vec<ReviewRecord> {
    let count = count.min(reviews.len());
    let (picked, _) = reviews.partial_shuffle(rng, count);
    picked.to_vec()
}
