//! SPARQL queries behind the choropleth layers.

use signpost::CLAIMANT_COUNT;

/// Claimant count percentage for every ward in Greater Manchester, July 2018.
pub const CLAIMANT_COUNT_QUERY: &str = concat!(
    "SELECT DISTINCT ?area_name ?area_code ?percent ",
    "WHERE {?metcty <http://www.w3.org/2000/01/rdf-schema#label> \"E11000001\" .",
    "?inmetcty <http://publishmydata.com/def/ontology/spatial/within> ?metcty .",
    "?wards <http://publishmydata.com/def/ontology/spatial/within> ?inmetcty .",
    "?wards <http://statistics.data.gov.uk/def/statistical-entity#code> <http://statistics.data.gov.uk/id/statistical-entity/E05> .",
    "?wards <http://statistics.data.gov.uk/def/statistical-geography#officialname> ?area_name.",
    "?wards <http://www.w3.org/2000/01/rdf-schema#label> ?area_code.",
    "?s2 <http://purl.org/linked-data/cube#dataSet> <http://gmdatastore.org.uk/data/claimant-count> . ",
    "?s2 <http://purl.org/linked-data/sdmx/2009/dimension#refArea> ?wards . ",
    "?s2 <http://gmdatastore.org.uk/def/measure-properties/percent> ?percent . ",
    "?s2 <http://purl.org/linked-data/sdmx/2009/dimension#refPeriod> <http://reference.data.gov.uk/id/month/2018-07> .}",
);

/// The query feeding a choropleth, by layer key.
pub fn for_choropleth(key: &str) -> Option<&'static str> {
    match key {
        CLAIMANT_COUNT => Some(CLAIMANT_COUNT_QUERY),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claimant_query_selects_join_columns() {
        let query = for_choropleth("claimantCount").unwrap();
        assert!(query.starts_with("SELECT DISTINCT ?area_name ?area_code ?percent"));
        assert!(query.contains("month/2018-07"));
        assert!(for_choropleth("unknown").is_none());
    }
}
