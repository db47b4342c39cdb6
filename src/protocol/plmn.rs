//! PLMN (MCC + MNC) to operator name lookup.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static OPERATORS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        // Mainland China
        ("46000", "China Mobile"),
        ("46002", "China Mobile"),
        ("46004", "China Mobile"),
        ("46007", "China Mobile"),
        ("46008", "China Mobile"),
        ("46001", "China Unicom"),
        ("46006", "China Unicom"),
        ("46009", "China Unicom"),
        ("46003", "China Telecom"),
        ("46005", "China Telecom"),
        ("46011", "China Telecom"),
        ("46015", "China Broadnet"),
        ("46020", "China Tietong"),
        // Hong Kong
        ("45400", "CSL"),
        ("45402", "CSL"),
        ("45403", "3 HK"),
        ("45404", "3 HK"),
        ("45406", "SmarTone"),
        ("45410", "CSL"),
        ("45412", "China Mobile HK"),
        ("45413", "China Mobile HK"),
        ("45415", "SmarTone"),
        ("45416", "PCCW Mobile"),
        ("45419", "PCCW Mobile"),
        ("45420", "PCCW Mobile"),
        // Macau
        ("45500", "SmarTone Macau"),
        ("45501", "CTM"),
        ("45502", "China Telecom Macau"),
        ("45503", "3 Macau"),
        ("45504", "CTM"),
        ("45505", "3 Macau"),
        ("45507", "China Telecom Macau"),
        // Taiwan
        ("46601", "Far EasTone"),
        ("46689", "T Star"),
        ("46692", "Chunghwa Telecom"),
        ("46697", "Taiwan Mobile"),
        // Japan
        ("44010", "NTT docomo"),
        ("44020", "SoftBank"),
        ("44050", "KDDI"),
        ("44051", "KDDI"),
        ("44011", "Rakuten Mobile"),
        // South Korea
        ("45005", "SK Telecom"),
        ("45006", "LG U+"),
        ("45008", "KT"),
        // Singapore
        ("52501", "Singtel"),
        ("52502", "Singtel"),
        ("52503", "M1"),
        ("52505", "StarHub"),
        // United Kingdom
        ("23410", "O2 UK"),
        ("23415", "Vodafone UK"),
        ("23420", "Three UK"),
        ("23430", "EE"),
        ("23433", "EE"),
        // United States (3-digit MNC)
        ("310260", "T-Mobile US"),
        ("310410", "AT&T"),
        ("311480", "Verizon"),
        ("310120", "Sprint"),
    ]
    .into_iter()
    .collect()
});

pub fn lookup(plmn: &str) -> Option<&'static str> {
    OPERATORS.get(plmn).copied()
}

/// Operator the SIM belongs to, from the first five IMSI digits.
///
/// Returns `None` when the IMSI is too short to carry a PLMN; an unknown
/// PLMN falls back to the raw five digits.
pub fn sim_operator(imsi: &str) -> Option<String> {
    let plmn = imsi.get(..5)?;
    Some(lookup(plmn).unwrap_or(plmn).to_string())
}

/// Live network operator from the firmware-reported PLMN.
///
/// Tries an exact match, then a five-character prefix when the code is
/// longer, then the raw code. An empty code mirrors the SIM operator.
pub fn network_operator(mnc: &str, sim_operator: &str) -> String {
    if mnc.is_empty() {
        return sim_operator.to_string();
    }
    if let Some(name) = lookup(mnc) {
        return name.to_string();
    }
    if let Some(name) = mnc.get(..5).filter(|_| mnc.len() > 5).and_then(lookup) {
        return name.to_string();
    }
    mnc.to_string()
}
