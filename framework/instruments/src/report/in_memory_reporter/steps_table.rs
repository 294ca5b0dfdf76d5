use tabled::Tabled;

#[derive(Tabled)]
pub struct BucketRow {
    pub bucket: String,
    pub steps: usize,
    pub failed: usize,
    #[tabled(display = "float2")]
    pub total_time_ms: f64,
    pub slowest_step: String,
    #[tabled(display = "float2")]
    pub slowest_time_ms: f64,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}
