// 🌐 Remote Tree Client - the portal's AJAX endpoints over one cookie session
//
// The portal serves its tree through four form-encoded POST endpoints that
// answer JSON. A browser is not needed: a GET of the index page hands out the
// session cookies, and every later call reuses them from the cookie store.

use crate::config::PortalConfig;
use crate::models::{
    flatten_categories, sort_periods_desc, sort_years_desc, Category, CategoryNode, Page, Period,
    Year, YearEntry,
};
use anyhow::Context;
use reqwest::blocking::Client;
use reqwest::header::REFERER;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const YEARS_ENDPOINT: &str = "yearinfo";
pub const PERIODS_ENDPOINT: &str = "currentyear";
pub const CATEGORIES_ENDPOINT: &str = "getcategorytreelist";
pub const PAGE_ENDPOINT: &str = "all";

const USER_AGENT: &str = concat!("price-crawler/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// ERRORS
// ============================================================================

/// Why a remote call produced no usable answer
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to `{endpoint}` failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("`{endpoint}` answered HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("`{endpoint}` answered malformed JSON: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn endpoint(&self) -> &str {
        match self {
            FetchError::Transport { endpoint, .. }
            | FetchError::Status { endpoint, .. }
            | FetchError::Decode { endpoint, .. } => endpoint,
        }
    }
}

// ============================================================================
// SOURCE TRAIT
// ============================================================================

/// The year → period → category tree plus paged rows.
///
/// Implemented over HTTP by [`HttpTreeClient`]; the traversal only sees this
/// trait, so tests drive it with in-memory portals.
pub trait PriceTreeSource {
    /// Years, most recent first
    fn list_years(&mut self) -> Result<Vec<Year>, FetchError>;

    /// Periods of a year, most recent first
    fn list_periods(&mut self, year: Year) -> Result<Vec<Period>, FetchError>;

    /// Second-level categories of a period's taxonomy
    fn list_categories(&mut self, period: &Period) -> Result<Vec<Category>, FetchError>;

    /// One page of rows, sorted ascending by sequence number
    fn fetch_page(
        &mut self,
        period: &Period,
        category: &Category,
        page_index: u32,
        page_size: u32,
    ) -> Result<Page, FetchError>;
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

pub struct HttpTreeClient {
    client: Client,
    portal: PortalConfig,
}

impl HttpTreeClient {
    pub fn new(portal: PortalConfig, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = Client::builder().cookie_store(true).user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(HttpTreeClient { client, portal })
    }

    pub fn portal(&self) -> &PortalConfig {
        &self.portal
    }

    /// Load the index page so the cookie store holds a session
    pub fn open_session(&self) -> Result<(), FetchError> {
        let url = self.portal.index_url();
        let endpoint = self.portal.index_path.clone();

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|source| FetchError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        debug!(url = %url, "session opened");
        Ok(())
    }

    fn post_form<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = self.portal.endpoint_url(endpoint);

        let response = self
            .client
            .post(&url)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(REFERER, self.portal.index_url())
            .form(form)
            .send()
            .map_err(|source| FetchError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(|source| FetchError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;

        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

impl PriceTreeSource for HttpTreeClient {
    fn list_years(&mut self) -> Result<Vec<Year>, FetchError> {
        let entries: Vec<YearEntry> = self.post_form(YEARS_ENDPOINT, &[])?;

        let mut years: Vec<Year> = entries.into_iter().map(|e| e.year_num).collect();
        sort_years_desc(&mut years);
        Ok(years)
    }

    fn list_periods(&mut self, year: Year) -> Result<Vec<Period>, FetchError> {
        let mut periods: Vec<Period> =
            self.post_form(PERIODS_ENDPOINT, &[("year", year.to_string())])?;

        sort_periods_desc(&mut periods);
        Ok(periods)
    }

    fn list_categories(&mut self, period: &Period) -> Result<Vec<Category>, FetchError> {
        let tree: Vec<CategoryNode> =
            self.post_form(CATEGORIES_ENDPOINT, &[("periodid", period.id.clone())])?;

        Ok(flatten_categories(&tree))
    }

    fn fetch_page(
        &mut self,
        period: &Period,
        category: &Category,
        page_index: u32,
        page_size: u32,
    ) -> Result<Page, FetchError> {
        self.post_form(
            PAGE_ENDPOINT,
            &[
                ("periodId", period.id.clone()),
                ("categoryIds", category.id.clone()),
                ("page", page_index.to_string()),
                ("rows", page_size.to_string()),
                ("order", "asc".to_string()),
                ("sort", "sequencenum".to_string()),
            ],
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn api_path(endpoint: &str) -> String {
        format!("/szzjxx/priceinfo/pc/{}", endpoint)
    }

    fn client_for(server: &Server) -> HttpTreeClient {
        HttpTreeClient::new(PortalConfig::new(&server.url()), None).unwrap()
    }

    #[test]
    fn test_open_session_hits_index() {
        let mut server = Server::new();
        let index = server
            .mock("GET", "/szzjxx/web/pc/index")
            .with_status(200)
            .with_header("set-cookie", "JSESSIONID=abc123; Path=/")
            .with_body("<html><div id=\"ztree\"></div></html>")
            .create();

        let client = client_for(&server);
        client.open_session().unwrap();

        index.assert();
    }

    #[test]
    fn test_open_session_reports_status() {
        let mut server = Server::new();
        server
            .mock("GET", "/szzjxx/web/pc/index")
            .with_status(503)
            .create();

        let err = client_for(&server).open_session().unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }

    #[test]
    fn test_list_years_sorted_descending() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", api_path(YEARS_ENDPOINT).as_str())
            .match_header("x-requested-with", "XMLHttpRequest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"yearNum": 2024}, {"yearNum": 2023}, {"yearNum": 2025}]"#)
            .create();

        let years = client_for(&server).list_years().unwrap();

        mock.assert();
        assert_eq!(years, vec![2025, 2024, 2023]);
    }

    #[test]
    fn test_list_periods_sends_year_and_sorts() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", api_path(PERIODS_ENDPOINT).as_str())
            .match_body(Matcher::UrlEncoded("year".into(), "2024".into()))
            .with_status(200)
            .with_body(
                r#"[
                    {"id": 101, "periodName": "2024年1月"},
                    {"id": 103, "periodName": "2024年3月"},
                    {"id": 102, "periodName": "2024年2月"}
                ]"#,
            )
            .create();

        let periods = client_for(&server).list_periods(2024).unwrap();

        mock.assert();
        let ids: Vec<&str> = periods.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["103", "102", "101"]);
    }

    #[test]
    fn test_list_categories_flattens_tree() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", api_path(CATEGORIES_ENDPOINT).as_str())
            .match_body(Matcher::UrlEncoded("periodid".into(), "103".into()))
            .with_status(200)
            .with_body(
                r#"[
                    {"id": 1, "name": "Metals", "children": [{"id": 11, "name": "Rebar"}, {"id": 12, "name": "Wire"}]},
                    {"id": 2, "name": "Childless", "children": null},
                    {"id": 3, "name": "Timber", "children": [{"id": 31, "name": "Plywood"}]}
                ]"#,
            )
            .create();

        let categories = client_for(&server)
            .list_categories(&Period::new("103", "2024年3月"))
            .unwrap();

        mock.assert();
        assert_eq!(categories.len(), 3);
        assert_eq!(categories[2], Category::new("31", "Plywood"));
    }

    #[test]
    fn test_fetch_page_sends_fixed_sort_order() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", api_path(PAGE_ENDPOINT).as_str())
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("periodId".into(), "103".into()),
                Matcher::UrlEncoded("categoryIds".into(), "11".into()),
                Matcher::UrlEncoded("page".into(), "2".into()),
                Matcher::UrlEncoded("rows".into(), "100".into()),
                Matcher::UrlEncoded("order".into(), "asc".into()),
                Matcher::UrlEncoded("sort".into(), "sequencenum".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"rows": [{"mc": "Rebar", "gg": "HRB400", "dw": "t", "djSq": "4210"}], "total": 101}"#)
            .create();

        let page = client_for(&server)
            .fetch_page(
                &Period::new("103", "2024年3月"),
                &Category::new("11", "Rebar"),
                2,
                100,
            )
            .unwrap();

        mock.assert();
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].mc, "Rebar");
        assert_eq!(page.total_count(), Some(101));
    }

    #[test]
    fn test_fetch_page_server_error_is_distinct_from_empty() {
        let mut server = Server::new();
        server
            .mock("POST", api_path(PAGE_ENDPOINT).as_str())
            .with_status(500)
            .create();

        let err = client_for(&server)
            .fetch_page(&Period::new("1", "p"), &Category::new("2", "c"), 1, 10)
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 500, .. }));
        assert_eq!(err.endpoint(), PAGE_ENDPOINT);
    }

    #[test]
    fn test_fetch_page_malformed_json() {
        let mut server = Server::new();
        server
            .mock("POST", api_path(PAGE_ENDPOINT).as_str())
            .with_status(200)
            .with_body("<html>session expired</html>")
            .create();

        let err = client_for(&server)
            .fetch_page(&Period::new("1", "p"), &Category::new("2", "c"), 1, 10)
            .unwrap_err();

        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[test]
    fn test_unreachable_portal_is_transport_error() {
        // Nothing listens on port 9 of the loopback interface
        let mut client = HttpTreeClient::new(
            PortalConfig::new("http://127.0.0.1:9"),
            Some(Duration::from_secs(2)),
        )
        .unwrap();

        let err = client.list_years().unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }
}
