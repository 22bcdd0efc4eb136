//! Per-site configuration: selectors, spec tables, URL shapes and
//! removed-listing markers.
//!
//! One parameterized harvester serves every rendered-page site; everything
//! that differs between sites lives in a [`SiteConfig`].

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::AppError;
use crate::models::VehicleCategory;
use crate::spec_table::{self, SpecTable};

/// Known source sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteId {
    AvtoNet,
    Autobid,
    DoberAvto,
    Autolina,
}

impl SiteId {
    pub const ALL: [SiteId; 4] = [
        SiteId::AvtoNet,
        SiteId::Autobid,
        SiteId::DoberAvto,
        SiteId::Autolina,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SiteId::AvtoNet => "avtonet",
            SiteId::Autobid => "autobid",
            SiteId::DoberAvto => "doberavto",
            SiteId::Autolina => "autolina",
        }
    }

    pub fn config(&self) -> &'static SiteConfig {
        match self {
            SiteId::AvtoNet => &AVTO_NET,
            SiteId::Autobid => &AUTOBID,
            SiteId::DoberAvto => &DOBERAVTO,
            SiteId::Autolina => &AUTOLINA,
        }
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SiteId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "avtonet" | "avto.net" => Ok(SiteId::AvtoNet),
            "autobid" | "autobid.de" => Ok(SiteId::Autobid),
            "doberavto" | "doberavto.si" => Ok(SiteId::DoberAvto),
            "autolina" | "autolina.ch" => Ok(SiteId::Autolina),
            _ => Err(format!("Unknown site: {}", s)),
        }
    }
}

/// Where a listing's engine descriptor lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineLocation {
    /// The value of the labelled spec row with this key.
    SpecRow(&'static str),
    /// The unlabelled spec value at this position.
    SpecValue(usize),
}

/// CSS selectors for one results-page layout.
///
/// Every selector list is an ordered fallback chain: the first selector that
/// matches wins.
#[derive(Debug, Clone, Copy)]
pub struct SiteLayout {
    /// Repeated listing containers.
    pub containers: &'static [&'static str],
    /// Selectors signalling that the results have rendered.
    pub ready: &'static [&'static str],
    pub name: &'static [&'static str],
    pub regular_price: &'static [&'static str],
    pub special_price: &'static [&'static str],
    /// Labelled spec rows; each row's cells are read with `spec_cell`.
    pub spec_rows: &'static [&'static str],
    pub spec_cell: &'static str,
    /// Unlabelled spec values, read in page order.
    pub spec_values: &'static [&'static str],
    pub engine: Option<EngineLocation>,
    pub misc: &'static [&'static str],
    pub image: &'static [&'static str],
    pub image_attr: &'static str,
    pub link: &'static [&'static str],
    pub link_attr: &'static str,
    /// Listings whose misc text contains this marker are skipped.
    pub skip_when_misc_contains: Option<&'static str>,
}

const EMPTY: &[&str] = &[];

/// How a site signals that a listing no longer exists.
#[derive(Debug, Clone, Copy)]
pub struct RemovalMarkers {
    /// Final URLs (after redirects) meaning the listing is gone.
    pub redirect_urls: &'static [&'static str],
    /// Page text meaning the listing is gone.
    pub content_markers: &'static [&'static str],
}

impl RemovalMarkers {
    pub const NONE: RemovalMarkers = RemovalMarkers {
        redirect_urls: EMPTY,
        content_markers: EMPTY,
    };
}

#[derive(Debug, Clone, Copy)]
pub struct SiteConfig {
    pub id: SiteId,
    pub name: &'static str,
    /// Link prefix identifying this site's records in the store.
    pub namespace: &'static str,
    /// Base for resolving relative image and link attributes.
    pub base_url: &'static str,
    /// Query parameter carrying the results page number.
    pub page_param: Option<&'static str>,
    /// Results-page layout; `None` for JSON API sites.
    pub layout: Option<SiteLayout>,
    pub removal: RemovalMarkers,
    /// Whether stored links may be probed and purged individually.
    pub probe_enabled: bool,
    /// First results page per category.
    pub category_urls: &'static [(VehicleCategory, &'static str)],
}

impl SiteConfig {
    pub fn category_url(&self, category: VehicleCategory) -> Option<&'static str> {
        self.category_urls
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, url)| *url)
    }

    pub fn spec_table(&self, category: VehicleCategory) -> Option<SpecTable> {
        match (self.id, category) {
            (SiteId::AvtoNet, VehicleCategory::Car) => Some(spec_table::AVTONET_CAR),
            (SiteId::AvtoNet, VehicleCategory::Motorcycle) => {
                Some(spec_table::AVTONET_MOTORCYCLE)
            }
            (SiteId::AvtoNet, VehicleCategory::Truck) => Some(spec_table::AVTONET_TRUCK),
            (SiteId::Autobid, _) => Some(spec_table::AUTOBID),
            _ => None,
        }
    }

    pub fn base(&self) -> Result<Url, AppError> {
        Url::parse(self.base_url)
            .map_err(|e| AppError::ParseError(format!("Invalid base URL {}: {}", self.base_url, e)))
    }

    /// The URL of results page `page`, derived from a first-page template.
    pub fn page_url(&self, template: &str, page: u32) -> Result<String, AppError> {
        match self.page_param {
            Some(param) => page_url(template, param, page),
            None => Ok(template.to_string()),
        }
    }

    pub fn owns(&self, link: &str) -> bool {
        link.starts_with(self.namespace)
    }
}

/// Sets (or replaces) `param` in `template`'s query string, keeping every
/// other parameter and its position.
pub fn page_url(template: &str, param: &str, page: u32) -> Result<String, AppError> {
    let mut url = Url::parse(template)
        .map_err(|e| AppError::ParseError(format!("Invalid results URL {}: {}", template, e)))?;

    let mut replaced = false;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if k == param {
                replaced = true;
                (k.into_owned(), page.to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (k, v) in &pairs {
            query.append_pair(k, v);
        }
        if !replaced {
            query.append_pair(param, &page.to_string());
        }
    }

    Ok(url.to_string())
}

/// Finds the site whose namespace owns `link`.
pub fn site_for_link(link: &str) -> Option<&'static SiteConfig> {
    SiteId::ALL
        .iter()
        .map(SiteId::config)
        .find(|site| site.owns(link))
}

const AVTONET_CAR_URL: &str = "https://www.avto.net/Ads/results.asp?znamka=&model=&modelID=&tip=&znamka2=&model2=&tip2=&znamka3=&model3=&tip3=&cenaMin=0&cenaMax=999999&letnikMin=0&letnikMax=2090&bencin=0&starost2=999&oblika=0&ccmMin=0&ccmMax=99999&mocMin=0&mocMax=999999&kmMin=0&kmMax=9999999&kwMin=0&kwMax=999&motortakt=0&motorvalji=0&lokacija=0&sirina=0&dolzina=&dolzinaMIN=0&dolzinaMAX=100&nosilnostMIN=0&nosilnostMAX=999999&sedezevMIN=0&sedezevMAX=9&lezisc=&presek=0&premer=0&col=0&vijakov=0&EToznaka=0&vozilo=&airbag=&barva=&barvaint=&doseg=0&BkType=0&BkOkvir=0&BkOkvirType=0&Bk4=0&EQ1=1000000000&EQ2=1000000000&EQ3=1000000000&EQ4=100000000&EQ5=1000000000&EQ6=1000000000&EQ7=1110100120&EQ8=101000000&EQ9=1000000020&EQ10=1000000000&KAT=1010000000&PIA=&PIAzero=&PIAOut=&PSLO=&akcija=0&paketgarancije=&broker=0&prikazkategorije=0&kategorija=0&ONLvid=0&ONLnak=0&zaloga=10&arhiv=0&presort=3&tipsort=DESC&stran=1";

const AVTONET_MOTORCYCLE_URL: &str = "https://www.avto.net/Ads/results.asp?znamka=&model=&modelID=&tip=&znamka2=&model2=&tip2=&znamka3=&model3=&tip3=&cenaMin=0&cenaMax=999999&letnikMin=0&letnikMax=2090&bencin=0&starost2=999&oblika=&ccmMin=0&ccmMax=99999&mocMin=&mocMax=&kmMin=0&kmMax=9999999&kwMin=0&kwMax=999&motortakt=0&motorvalji=0&lokacija=0&sirina=&dolzina=&dolzinaMIN=&dolzinaMAX=&nosilnostMIN=&nosilnostMAX=&sedezevMIN=&sedezevMAX=&lezisc=&presek=&premer=&col=&vijakov=&EToznaka=&vozilo=&airbag=&barva=&barvaint=&doseg=&BkType=&BkOkvir=&BkOkvirType=&Bk4=&EQ1=1000000000&EQ2=1000000000&EQ3=1000000000&EQ4=100000000&EQ5=1000000000&EQ6=1000000000&EQ7=1110100120&EQ8=101000000&EQ9=100000002&EQ10=100000000&KAT=1060000000&PIA=&PIAzero=&PIAOut=&PSLO=&akcija=&paketgarancije=&broker=&prikazkategorije=&kategorija=61000&ONLvid=&ONLnak=&zaloga=10&arhiv=&presort=&tipsort=&stran=1";

pub static AVTO_NET: SiteConfig = SiteConfig {
    id: SiteId::AvtoNet,
    name: "avto.net",
    namespace: "https://www.avto.net/",
    base_url: "https://www.avto.net/Ads/results.asp",
    page_param: Some("stran"),
    layout: Some(SiteLayout {
        containers: &[
            "div.row.bg-white.position-relative.GO-Results-Row.GO-Shadow-B",
            "div.row.bg-white.mb-3.pb-3.pb-sm-0.position-relative.GO-Shadow-B.GO-Results-Row",
        ],
        ready: &["div.row.bg-white"],
        name: &["div.GO-Results-Naziv span"],
        regular_price: &[
            "div.GO-Results-Top-Price-TXT-Regular",
            "div.GO-Results-Price-TXT-Regular",
        ],
        special_price: &[
            "div.GO-Results-Top-Price-TXT-AkcijaCena",
            "div.GO-Results-Price-TXT-AkcijaCena",
        ],
        spec_rows: &["table.table.table-striped.table-sm.table-borderless.font-weight-normal tr"],
        spec_cell: "td",
        spec_values: EMPTY,
        engine: Some(EngineLocation::SpecRow("Motor")),
        misc: EMPTY,
        image: &[
            "div.GO-Results-Top-PhotoTop a img",
            "div.col-auto.p-3.GO-Results-Photo div a img",
        ],
        image_attr: "src",
        link: &["a.stretched-link"],
        link_attr: "href",
        skip_when_misc_contains: None,
    }),
    removal: RemovalMarkers {
        redirect_urls: &["https://www.avto.net/unvalid.asp"],
        content_markers: EMPTY,
    },
    probe_enabled: true,
    category_urls: &[
        (VehicleCategory::Car, AVTONET_CAR_URL),
        (VehicleCategory::Motorcycle, AVTONET_MOTORCYCLE_URL),
    ],
};

pub static AUTOBID: SiteConfig = SiteConfig {
    id: SiteId::Autobid,
    name: "autobid.de",
    namespace: "https://autobid.de/",
    base_url: "https://autobid.de/",
    page_param: Some("currentPage"),
    layout: Some(SiteLayout {
        containers: &["div.-mx-3.block.px-3.pt-3.cursor-pointer"],
        ready: &["div.-mx-3.block.px-3.pt-3.cursor-pointer"],
        name: &["a.relative.max-w-max"],
        regular_price: &[
            "div.flex.w-full.flex-col.xl\\:mt-0.xl\\:w-auto.md\\:w-1\\/4.hidden.md\\:flex span span span",
        ],
        special_price: EMPTY,
        spec_rows: EMPTY,
        spec_cell: "td",
        spec_values: &["span.car-parameter-value.w-full.sm\\:w-auto"],
        engine: Some(EngineLocation::SpecValue(2)),
        misc: &["p.mt-4"],
        image: &["picture.flex.h-auto.w-full.max-w-full.object-contain img"],
        image_attr: "src",
        link: &["a.flex.w-full.min-w-full.items-center.justify-center.bg-black"],
        link_attr: "href",
        skip_when_misc_contains: Some("drugo"),
    }),
    removal: RemovalMarkers {
        redirect_urls: EMPTY,
        content_markers: &["Stran ni bila najdena"],
    },
    probe_enabled: true,
    category_urls: &[
        (
            VehicleCategory::Car,
            "https://autobid.de/sl/rezultati-iskanja?e367=1&sortingType=auctionStartDate-DESCENDING&currentPage=1",
        ),
        (
            VehicleCategory::Motorcycle,
            "https://autobid.de/sl/rezultati-iskanja?e367=2&sortingType=auctionStartDate-DESCENDING&currentPage=1",
        ),
        (
            VehicleCategory::Truck,
            "https://autobid.de/sl/rezultati-iskanja?e367=3&sortingType=auctionStartDate-DESCENDING&currentPage=1",
        ),
    ],
};

pub static DOBERAVTO: SiteConfig = SiteConfig {
    id: SiteId::DoberAvto,
    name: "doberavto.si",
    namespace: "https://www.doberavto.si/oglas/",
    base_url: "https://www.doberavto.si/",
    page_param: None,
    layout: None,
    removal: RemovalMarkers::NONE,
    probe_enabled: false,
    category_urls: &[(
        VehicleCategory::Car,
        "https://www.doberavto.si/internal-api/v1/marketplace/search?results=5000&from=0&includeSold=true&hiddenVin=false",
    )],
};

pub static AUTOLINA: SiteConfig = SiteConfig {
    id: SiteId::Autolina,
    name: "autolina.ch",
    namespace: "https://www.autolina.ch/auto/",
    base_url: "https://www.autolina.ch/",
    page_param: None,
    layout: None,
    removal: RemovalMarkers::NONE,
    probe_enabled: false,
    category_urls: &[(
        VehicleCategory::Car,
        "https://m.autolina.ch/api/v2/searchcars?offset=20&limit=20",
    )],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_id_parse() {
        assert_eq!("avto.net".parse::<SiteId>(), Ok(SiteId::AvtoNet));
        assert_eq!("Autobid".parse::<SiteId>(), Ok(SiteId::Autobid));
        assert!("mobile.de".parse::<SiteId>().is_err());
        for id in SiteId::ALL {
            assert_eq!(id.as_str().parse::<SiteId>(), Ok(id));
            assert_eq!(id.config().id, id);
        }
    }

    #[test]
    fn test_page_url_replaces_existing_param() {
        let url = page_url("https://example.com/r?a=1&stran=1&b=2", "stran", 7).unwrap();
        assert_eq!(url, "https://example.com/r?a=1&stran=7&b=2");
    }

    #[test]
    fn test_page_url_appends_missing_param() {
        let url = page_url("https://example.com/r?a=1", "currentPage", 3).unwrap();
        assert_eq!(url, "https://example.com/r?a=1&currentPage=3");
    }

    #[test]
    fn test_page_url_rejects_garbage() {
        assert!(matches!(
            page_url("not a url", "stran", 1),
            Err(AppError::ParseError(_))
        ));
    }

    #[test]
    fn test_category_urls() {
        assert!(AVTO_NET.category_url(VehicleCategory::Car).is_some());
        assert!(AVTO_NET.category_url(VehicleCategory::Truck).is_none());
        let moto = AVTO_NET.category_url(VehicleCategory::Motorcycle).unwrap();
        assert!(moto.contains("KAT=1060000000"));
        assert!(!moto.contains(' '));
        assert!(AUTOBID.category_url(VehicleCategory::Truck).unwrap().contains("e367=3"));
    }

    #[test]
    fn test_avtonet_page_url_keeps_filters() {
        let template = AVTO_NET.category_url(VehicleCategory::Car).unwrap();
        let url = AVTO_NET.page_url(template, 4).unwrap();
        assert!(url.ends_with("stran=4"));
        assert!(url.contains("KAT=1010000000"));
    }

    #[test]
    fn test_spec_tables_only_for_rendered_sites() {
        for category in VehicleCategory::ALL {
            assert!(AVTO_NET.spec_table(category).is_some());
            assert!(AUTOBID.spec_table(category).is_some());
            assert!(DOBERAVTO.spec_table(category).is_none());
        }
    }

    #[test]
    fn test_site_for_link() {
        assert_eq!(
            site_for_link("https://www.avto.net/Ads/details.asp?id=1").map(|s| s.id),
            Some(SiteId::AvtoNet)
        );
        assert_eq!(
            site_for_link("https://autobid.de/sl/details/1").map(|s| s.id),
            Some(SiteId::Autobid)
        );
        assert!(site_for_link("https://mobile.de/1").is_none());
    }

    #[test]
    fn test_probe_allow_list() {
        let probed: Vec<SiteId> = SiteId::ALL
            .into_iter()
            .filter(|id| id.config().probe_enabled)
            .collect();
        assert_eq!(probed, vec![SiteId::AvtoNet, SiteId::Autobid]);
    }
}
