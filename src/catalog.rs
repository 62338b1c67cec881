//! A representative catalog of FortiOS objects.
//!
//! Each entry is a plain field table; adding an object type means adding a
//! function here and listing it in [`resources`] or [`data_sources`].

use crate::schema::{AttributeFlags, FieldSpec, ResourceSpec};

/// `fortios_system_interface`: one network interface.
pub fn system_interface() -> ResourceSpec {
    ResourceSpec::new("fortios_system_interface", "system/interface")
        .with_mkey("name")
        .with_description("Configure interfaces.")
        .with_fields([
            FieldSpec::string("name")
                .required()
                .with_force_new()
                .with_description("Name of the interface."),
            FieldSpec::string("vdom").required(),
            FieldSpec::string("type").optional_computed(),
            FieldSpec::ipmask("ip").optional_computed(),
            FieldSpec::integer("vlanid").optional_computed(),
            FieldSpec::string("interface").optional_computed(),
            FieldSpec::string("alias"),
            FieldSpec::string("status").optional_computed(),
            FieldSpec::integer("mtu").optional_computed(),
            FieldSpec::string("allowaccess").optional_computed(),
            FieldSpec::string("password").sensitive(),
            FieldSpec::string("dhcp-relay-ip").optional_computed(),
            FieldSpec::string("vrip6_link_local").optional_computed(),
            FieldSpec::string("macaddr").computed(),
            FieldSpec::list(
                "secondaryip",
                vec![
                    FieldSpec::integer("id").optional_computed(),
                    FieldSpec::ipmask("ip").optional_computed(),
                    FieldSpec::string("allowaccess").optional_computed(),
                    FieldSpec::integer("gwdetect").optional_computed(),
                ],
            )
            .with_match_key("id"),
            FieldSpec::object(
                "ipv6",
                vec![
                    FieldSpec::string("ip6-mode").optional_computed(),
                    FieldSpec::string("ip6-address").optional_computed(),
                    FieldSpec::string("ip6-allowaccess").optional_computed(),
                ],
            ),
        ])
}

/// `fortios_system_global`: device-wide settings, a singleton.
pub fn system_global() -> ResourceSpec {
    ResourceSpec::new("fortios_system_global", "system/global")
        .singleton("SystemGlobal")
        .with_description("Configure global attributes.")
        .with_fields([
            FieldSpec::string("hostname").optional_computed(),
            FieldSpec::string("alias").optional_computed(),
            FieldSpec::integer("admintimeout").optional_computed(),
            FieldSpec::integer("admin-sport").optional_computed(),
            FieldSpec::string("admin-https-redirect").optional_computed(),
            FieldSpec::string("timezone").optional_computed(),
            FieldSpec::string("gui-theme").optional_computed(),
            FieldSpec::float("cpu-use-threshold").optional_computed(),
            FieldSpec::list(
                "internet-service-download-list",
                vec![FieldSpec::integer("id").optional_computed()],
            )
            .with_match_key("id"),
        ])
}

/// `fortios_system_admin`: an administrator account.
pub fn system_admin() -> ResourceSpec {
    ResourceSpec::new("fortios_system_admin", "system/admin")
        .with_mkey("name")
        .with_description("Configure admin users.")
        .with_fields([
            FieldSpec::string("name").required().with_force_new(),
            FieldSpec::string("accprofile").optional_computed(),
            FieldSpec::string("comments"),
            FieldSpec::ipmask("trusthost1").optional_computed(),
            FieldSpec::ipmask("trusthost2").optional_computed(),
            FieldSpec::ipmask("trusthost3").optional_computed(),
            FieldSpec::string("password").sensitive(),
            FieldSpec::string("two-factor").optional_computed(),
            FieldSpec::set("vdom", vec![FieldSpec::string("name").optional_computed()])
                .with_match_key("name")
                .with_sort_key("name"),
            FieldSpec::list(
                "gui-dashboard",
                vec![
                    FieldSpec::integer("id").optional_computed(),
                    FieldSpec::string("name").optional_computed(),
                    FieldSpec::list(
                        "widget",
                        vec![
                            FieldSpec::integer("id").optional_computed(),
                            FieldSpec::string("type").optional_computed(),
                            FieldSpec::integer("x-pos").optional_computed(),
                            FieldSpec::integer("y-pos").optional_computed(),
                        ],
                    )
                    .with_match_key("id"),
                ],
            )
            .with_match_key("id"),
        ])
}

/// `fortios_wirelesscontroller_widsprofile`: a wireless IDS profile.
pub fn wireless_controller_wids_profile() -> ResourceSpec {
    ResourceSpec::new(
        "fortios_wirelesscontroller_widsprofile",
        "wireless-controller/wids-profile",
    )
    .with_mkey("name")
    .with_description("Configure wireless intrusion detection system (WIDS) profiles.")
    .with_fields([
        FieldSpec::string("name").required().with_force_new(),
        FieldSpec::string("comment"),
        FieldSpec::string("sensor-mode").optional_computed(),
        FieldSpec::string("ap-scan").optional_computed(),
        FieldSpec::integer("ap-bgscan-period").optional_computed(),
        FieldSpec::set(
            "ap-scan-channel-list-2G-5G",
            vec![FieldSpec::string("chan").optional_computed()],
        )
        .with_local_key("ap_scan_channel_list_2g_5g")
        .with_match_key("chan")
        .with_sort_key("chan"),
        FieldSpec::set(
            "ap-bgscan-disable-schedules",
            vec![FieldSpec::string("name").optional_computed()],
        )
        .with_match_key("name")
        .with_sort_key("name"),
    ])
}

/// `fortios_system_interface` as a data source.
pub fn system_interface_data_source() -> ResourceSpec {
    let mut spec = system_interface();
    spec.description = Some("Get information on a FortiOS interface.".to_string());
    for field in &mut spec.fields {
        if field.local_key != "name" {
            field.flags = AttributeFlags {
                sensitive: field.is_sensitive(),
                ..AttributeFlags::computed()
            };
        }
    }
    spec
}

/// All resources in the catalog.
pub fn resources() -> Vec<ResourceSpec> {
    vec![
        system_interface(),
        system_global(),
        system_admin(),
        wireless_controller_wids_profile(),
    ]
}

/// All data sources in the catalog.
pub fn data_sources() -> Vec<ResourceSpec> {
    vec![system_interface_data_source()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<_> = resources().into_iter().map(|r| r.name).collect();
        assert_eq!(names.len(), resources().len());
    }

    #[test]
    fn test_tables_have_an_identity() {
        for spec in resources() {
            assert!(
                spec.is_singleton() || spec.mkey_field().is_some(),
                "{} has neither an mkey field nor a singleton id",
                spec.name
            );
        }
    }

    #[test]
    fn test_key_exceptions() {
        let wids = wireless_controller_wids_profile();
        let channels = wids.field("ap_scan_channel_list_2g_5g").unwrap();
        assert_eq!(channels.wire_key, "ap-scan-channel-list-2G-5G");
        let options = channels.list_options().unwrap();
        assert!(options.set);
        assert_eq!(options.match_key.as_deref(), Some("chan"));

        let interface = system_interface();
        assert_eq!(
            interface.field("vrip6_link_local").unwrap().wire_key,
            "vrip6_link_local"
        );
        assert_eq!(interface.field("dhcp_relay_ip").unwrap().wire_key, "dhcp-relay-ip");
    }

    #[test]
    fn test_singleton() {
        let global = system_global();
        assert!(global.is_singleton());
        assert_eq!(global.singleton_id.as_deref(), Some("SystemGlobal"));
    }

    #[test]
    fn test_nested_lists_declare_match_keys() {
        fn check(fields: &[FieldSpec], owner: &str) {
            for field in fields {
                if let FieldKind::NestedList(options) = &field.kind {
                    let key = options.match_key.as_deref().unwrap_or_default();
                    assert!(
                        field.child(key).is_some(),
                        "{}.{} matches on missing child {:?}",
                        owner,
                        field.local_key,
                        key
                    );
                }
                check(&field.children, owner);
            }
        }
        for spec in resources() {
            check(&spec.fields, &spec.name);
        }
    }

    #[test]
    fn test_data_source_fields_are_computed() {
        let spec = system_interface_data_source();
        assert!(spec.field("name").unwrap().flags.required);
        assert!(spec.field("ip").unwrap().flags.computed);
        assert!(!spec.field("ip").unwrap().flags.optional);
        assert!(spec.field("password").unwrap().is_sensitive());
    }
}
