use async_trait::async_trait;
use bus_departures::clock::Instant;
use bus_departures::features::GeoJsonFeatureSource;
use bus_departures::fetch::HttpClient;
use bus_departures::geo::Coordinate;
use bus_departures::live::{LiveClient, LiveQuery, LiveSource, NormalizeOptions};
use bus_departures::locator::{NearestStop, locate_nearest};
use bus_departures::resolver::DepartureResolver;
use bus_departures::stop::find_stop;
use bus_departures::types::{DepartureSource, ResolutionSource};
use chrono::TimeZone;
use chrono_tz::Asia::Kolkata;

const LAYER: &str = "bus-stops";

fn source() -> GeoJsonFeatureSource {
    GeoJsonFeatureSource::from_geojson(include_str!("fixtures/stops.geojson"), LAYER)
        .expect("Failed to parse fixture")
}

fn at(h: u32, m: u32) -> Instant {
    Kolkata.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
}

/// Serves a fixed body with a fixed status for every request.
struct CannedHttp {
    status: u16,
    body: &'static str,
}

#[async_trait]
impl HttpClient for CannedHttp {
    async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let resp = http::Response::builder()
            .status(self.status)
            .body(self.body)
            .unwrap();
        Ok(reqwest::Response::from(resp))
    }
}

struct NoLive;

#[async_trait]
impl LiveSource for NoLive {
    async fn fetch_live_arrivals(
        &self,
        _query: &LiveQuery,
        _now: &Instant,
    ) -> Vec<bus_departures::types::LiveArrival> {
        Vec::new()
    }
}

#[test]
fn test_nearest_stop_from_fixture() {
    let user = Coordinate::new(15.4912, 73.8281);
    match locate_nearest(&source(), LAYER, &user, 2.0) {
        NearestStop::Found { stop, distance_km } => {
            assert_eq!(stop.id, "KTC-PANAJI");
            assert!(distance_km < 0.1);
            assert!(stop.timetable.is_some());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_full_pipeline_prefers_live() {
    let stop = find_stop(&source(), LAYER, "KTC-PANAJI").unwrap();
    let http = CannedHttp {
        status: 200,
        body: r#"{"stopRouteEtas": {"1001:12": "{\"eta\": 240, \"vNo\": \"GA03X1111\", \"dest\": \"Margao\", \"ag\": \"ktcl\"}"}}"#,
    };
    let resolver = DepartureResolver::new(LiveClient::new(
        http,
        "https://eta.example.com",
        NormalizeOptions::default(),
    ));

    let now = at(9, 5);
    let resolution = resolver.resolve(&stop, &now).await;
    assert_eq!(resolution.source, ResolutionSource::Live);
    assert_eq!(resolution.departures.len(), 1);
    let d = &resolution.departures[0];
    assert_eq!(d.route, "12");
    assert_eq!(d.minutes_until(&now), 4);
    assert_eq!(d.agency_name.as_deref(), Some("KTCL"));
    assert_eq!(d.source, DepartureSource::Live);
}

#[tokio::test]
async fn test_full_pipeline_live_outage_falls_back_to_timetable() {
    let stop = find_stop(&source(), LAYER, "KTC-PANAJI").unwrap();
    let http = CannedHttp {
        status: 502,
        body: "Bad Gateway",
    };
    let resolver = DepartureResolver::new(LiveClient::new(
        http,
        "https://eta.example.com",
        NormalizeOptions::default(),
    ));

    let now = at(9, 5);
    let resolution = resolver.resolve(&stop, &now).await;
    assert_eq!(resolution.source, ResolutionSource::Scheduled);
    let routes: Vec<(&str, i64)> = resolution
        .departures
        .iter()
        .map(|d| (d.route.as_str(), d.minutes_until(&now)))
        .collect();
    assert_eq!(routes, vec![("41", 15), ("12", 25), ("12", 45)]);
    assert_eq!(resolution.departures[0].is_ac, Some(true));
}

#[tokio::test]
async fn test_inline_timetable_falls_back_to_tomorrow() {
    let stop = find_stop(&source(), LAYER, "MIRAMAR").unwrap();
    let resolution = DepartureResolver::new(NoLive).resolve(&stop, &at(9, 5)).await;
    assert_eq!(resolution.source, ResolutionSource::Tomorrow);
    assert_eq!(resolution.departures.len(), 2);
    assert!(resolution.departures.iter().all(|d| d.is_next_day));
}

#[tokio::test]
async fn test_stop_without_data() {
    let stop = find_stop(&source(), LAYER, "MARGAO").unwrap();
    let resolution = DepartureResolver::new(NoLive).resolve(&stop, &at(9, 5)).await;
    assert_eq!(resolution.source, ResolutionSource::NoData);
    assert!(resolution.departures.is_empty());
}
