use nexia_web::{
    Error, HistoryPeriod, OperatingMode, Selector, Thermostat, Zone, find_thermostat,
};

fn thermostat(id: u64, name: &str, mode: OperatingMode) -> Thermostat {
    Thermostat {
        id,
        name: name.to_string(),
        operating_mode: mode,
        zones: vec![Zone {
            id: Some(id * 10),
            temperature: 70.0,
            cooling_setpoint: 76.0,
            heating_setpoint: 66.0,
        }],
    }
}

fn house() -> Vec<Thermostat> {
    vec![
        thermostat(1, "LivingRoom", OperatingMode::Cool),
        thermostat(2, "Bedroom", OperatingMode::Heat),
        thermostat(3, "1", OperatingMode::Cool),
    ]
}

#[test]
fn name_lookup_is_case_insensitive() {
    let list = house();
    let a = find_thermostat(&list, &"LivingRoom".into()).unwrap();
    let b = find_thermostat(&list, &"livingroom".into()).unwrap();
    assert_eq!(a.id, 1);
    assert_eq!(a, b);
}

#[test]
fn id_match_beats_name_match() {
    // thermostat 3 is *named* "1"; the id match on thermostat 1 wins
    let list = house();
    let found = find_thermostat(&list, &Selector::Name("1".into())).unwrap();
    assert_eq!(found.id, 1);
}

#[test]
fn numeric_selector_matches_id_only() {
    let list = house();
    assert_eq!(find_thermostat(&list, &Selector::Id(2)).unwrap().name, "Bedroom");
    assert!(matches!(
        find_thermostat(&list, &Selector::Id(9)),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn empty_list_is_not_found() {
    assert!(matches!(
        find_thermostat(&[], &"Den".into()),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn setpoint_follows_mode() {
    assert_eq!(thermostat(1, "a", OperatingMode::Cool).setpoint(), Some(76.0));
    assert_eq!(thermostat(1, "a", OperatingMode::Heat).setpoint(), Some(66.0));
    assert_eq!(
        thermostat(1, "a", OperatingMode::Other("AUTO".into())).setpoint(),
        None
    );
}

#[test]
fn only_first_zone_is_used() {
    let mut t = thermostat(1, "a", OperatingMode::Cool);
    t.zones.push(Zone {
        id: Some(99),
        temperature: 90.0,
        cooling_setpoint: 95.0,
        heating_setpoint: 50.0,
    });
    assert_eq!(t.temperature(), Some(70.0));
    assert_eq!(t.primary_zone().unwrap().id, Some(10));
}

#[test]
fn thermostat_without_zones() {
    let mut t = thermostat(1, "a", OperatingMode::Cool);
    t.zones.clear();
    assert_eq!(t.temperature(), None);
    assert_eq!(t.setpoint(), None);
}

#[test]
fn operating_mode_parsing() {
    assert_eq!(OperatingMode::from_portal_str("COOL"), OperatingMode::Cool);
    assert_eq!(OperatingMode::from_portal_str("heat"), OperatingMode::Heat);
    assert_eq!(
        OperatingMode::from_portal_str("AUTO"),
        OperatingMode::Other("AUTO".into())
    );
    assert_eq!(OperatingMode::Other("OFF".into()).to_string(), "OFF");
}

#[test]
fn operating_mode_serde_uses_portal_strings() {
    let mode: OperatingMode = serde_json::from_str(r#""HEAT""#).unwrap();
    assert_eq!(mode, OperatingMode::Heat);
    assert_eq!(serde_json::to_string(&OperatingMode::Cool).unwrap(), r#""COOL""#);
}

#[test]
fn history_period_from_annual_flag() {
    assert_eq!(HistoryPeriod::from_annual(true), HistoryPeriod::Monthly);
    assert_eq!(HistoryPeriod::from_annual(false), HistoryPeriod::Daily);
}
