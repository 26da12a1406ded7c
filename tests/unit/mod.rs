// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for storage-e2e.
//!
//! These tests run without a cluster or a CLI binary and exercise the
//! public building blocks in isolation.

mod crd_tests {
    use kube::{CustomResourceExt, Resource};
    use storage_e2e::crd::{
        LSO_NAMESPACE, LocalVolumeResource, LocalVolumeSetResource, NodeSelector,
    };

    #[test]
    fn test_crd_names() {
        assert_eq!(
            LocalVolumeResource::crd_name(),
            "localvolumes.local.storage.openshift.io"
        );
        assert_eq!(
            LocalVolumeSetResource::crd_name(),
            "localvolumesets.local.storage.openshift.io"
        );
    }

    #[test]
    fn test_api_versions() {
        assert_eq!(
            LocalVolumeResource::api_version(&()),
            "local.storage.openshift.io/v1"
        );
        assert_eq!(
            LocalVolumeSetResource::api_version(&()),
            "local.storage.openshift.io/v1alpha1"
        );
    }

    #[test]
    fn test_root_types_carry_kind_and_plural() {
        assert_eq!(LocalVolumeResource::kind(&()), "LocalVolume");
        assert_eq!(LocalVolumeResource::plural(&()), "localvolumes");
        assert_eq!(LocalVolumeSetResource::kind(&()), "LocalVolumeSet");
        assert_eq!(LocalVolumeSetResource::plural(&()), "localvolumesets");
        let crd = LocalVolumeSetResource::crd();
        assert_eq!(crd.spec.names.kind, "LocalVolumeSet");
        assert_eq!(crd.spec.scope, "Namespaced");
    }

    #[test]
    fn test_hostname_selector() {
        let selector = NodeSelector::hostnames(vec!["worker-0".into(), "worker-1".into()]);
        let value = serde_json::to_value(&selector).unwrap();
        let expr = &value["nodeSelectorTerms"][0]["matchExpressions"][0];
        assert_eq!(expr["key"], "kubernetes.io/hostname");
        assert_eq!(expr["operator"], "In");
        assert_eq!(expr["values"][1], "worker-1");
    }

    #[test]
    fn test_status_ignores_unknown_fields() {
        let lvs: LocalVolumeSetResource = serde_json::from_value(serde_json::json!({
            "apiVersion": "local.storage.openshift.io/v1alpha1",
            "kind": "LocalVolumeSet",
            "metadata": {"name": "lvs", "namespace": LSO_NAMESPACE},
            "spec": {"storageClassName": "lvs-sc", "volumeMode": "Block"},
            "status": {
                "totalProvisionedDeviceCount": 4,
                "observedGeneration": 2,
                "conditions": [{"type": "Available", "status": "True"}]
            }
        }))
        .unwrap();
        let status = lvs.status.unwrap();
        assert_eq!(status.total_provisioned_device_count, Some(4));
        assert_eq!(status.conditions[0].type_, "Available");
    }
}

mod error_tests {
    use std::time::Duration;
    use storage_e2e::Error;

    fn failed(stderr: &str) -> Error {
        Error::CommandFailed {
            command: "oc get pvc x".to_string(),
            code: Some(1),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_not_found_classification() {
        assert!(failed("Error from server (NotFound): persistentvolumeclaims \"x\" not found").is_not_found());
        assert!(Error::NotFound("volume vol-1".into()).is_not_found());
        assert!(!failed("Error from server (Forbidden): nope").is_not_found());
    }

    #[test]
    fn test_missing_resource_type_is_not_absence() {
        let err = failed("error: the server doesn't have a resource type \"localvolume\"");
        assert!(!err.is_not_found());
        assert!(err.is_missing_resource_type());
        assert!(!err.is_retryable());
        assert!(!failed("Error from server (NotFound): pvc \"x\" not found").is_missing_resource_type());
    }

    #[test]
    fn test_retry_classification() {
        assert!(failed("dial tcp 10.0.0.1:6443: connect: connection refused").is_retryable());
        assert!(failed("etcdserver: leader changed").is_retryable());
        assert!(!failed("Error from server (NotFound): x").is_retryable());
        assert!(
            !Error::Timeout {
                description: "pvc x Bound".into(),
                timeout: Duration::from_secs(1),
                last_observed: "Pending".into(),
            }
            .is_retryable()
        );
    }
}

mod template_tests {
    use storage_e2e::TemplateParams;
    use storage_e2e::config::default_fixtures_dir;
    use storage_e2e::template::{Template, template_path};

    #[test]
    fn test_shipped_templates_parse() {
        for file in [
            "storageclass-template.yaml",
            "pvc-template.yaml",
            "pv-template.yaml",
            "pod-template.yaml",
            "dep-template.yaml",
            "service-template.yaml",
            "nfs-server-deploy-template.yaml",
        ] {
            let path = template_path(&default_fixtures_dir(), file);
            assert!(Template::load(&path).is_ok(), "{file} failed to load");
        }
    }

    #[test]
    fn test_pvc_template_defaults() {
        let template =
            Template::load(&template_path(&default_fixtures_dir(), "pvc-template.yaml")).unwrap();
        let list = template
            .process(&TemplateParams::new().param("PVCNAME", "pvc-a").param("SCNAME", "gp3-csi"))
            .unwrap();
        let pvc = &list["items"][0];
        assert_eq!(pvc["metadata"]["name"], "pvc-a");
        assert_eq!(pvc["spec"]["accessModes"][0], "ReadWriteOnce");
        assert_eq!(pvc["spec"]["volumeMode"], "Filesystem");
        assert_eq!(pvc["spec"]["resources"]["requests"]["storage"], "1Gi");
        assert_eq!(pvc["spec"]["storageClassName"], "gp3-csi");
    }

    #[test]
    fn test_document_without_objects_is_rejected() {
        assert!(Template::parse("kind: Template\nparameters: []\n").is_err());
    }
}

mod matrix_tests {
    use storage_e2e::config::{SUPPORT_MATRIX_FILE, default_fixtures_dir};
    use storage_e2e::{CloudProvider, SupportMatrix};

    #[test]
    fn test_shipped_matrix_covers_default_provisioners() {
        let matrix =
            SupportMatrix::load(&default_fixtures_dir().join(SUPPORT_MATRIX_FILE)).unwrap();
        for provider in [
            CloudProvider::Aws,
            CloudProvider::Azure,
            CloudProvider::Gcp,
            CloudProvider::AlibabaCloud,
            CloudProvider::IbmCloud,
            CloudProvider::Vsphere,
            CloudProvider::OpenStack,
        ] {
            let default = provider.default_block_provisioner().unwrap();
            assert!(
                matrix.provisioners(&provider).iter().any(|p| p == default),
                "{provider} matrix lacks {default}"
            );
        }
        assert!(matrix.provisioners(&CloudProvider::BareMetal).is_empty());
    }
}

mod util_tests {
    use std::cmp::Ordering;
    use storage_e2e::util::{
        compare_versions, dedup_sorted, difference, intersect, random_string, unique_name,
        version_is_above,
    };

    #[test]
    fn test_random_names() {
        let a = random_string();
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert!(unique_name("pvc").starts_with("pvc-"));
        assert_ne!(unique_name("pvc"), unique_name("pvc"));
    }

    #[test]
    fn test_slices() {
        let a = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let b = vec!["c".to_string(), "a".to_string()];
        assert_eq!(intersect(&a, &b), vec!["a", "c"]);
        assert_eq!(difference(&a, &b), vec!["b"]);
        assert_eq!(
            dedup_sorted(vec!["b".into(), "a".into(), "b".into()]),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_versions() {
        assert_eq!(compare_versions("4.14", "4.9").unwrap(), Ordering::Greater);
        assert!(version_is_above("4.15.2", "4.15.1"));
        assert!(!version_is_above("4.15", "4.15"));
        assert!(compare_versions("4.15", "4.15.0").is_err());
    }
}

mod config_tests {
    use std::time::Duration;
    use storage_e2e::config::{CLI_ENV, CLI_TIMEOUT_ENV, CLOUD_PROVIDER_ENV, NAMESPACE_ENV};
    use storage_e2e::{CloudProvider, Error, SuiteConfig};

    #[test]
    fn test_lookup_overrides() {
        let config = SuiteConfig::from_lookup(|key| match key {
            CLI_ENV => Some("kubectl".to_string()),
            NAMESPACE_ENV => Some("storage-ns".to_string()),
            CLOUD_PROVIDER_ENV => Some("GCP".to_string()),
            CLI_TIMEOUT_ENV => Some("30".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.cli_binary, "kubectl");
        assert_eq!(config.namespace.as_deref(), Some("storage-ns"));
        assert_eq!(config.cloud_provider, Some(CloudProvider::Gcp));
        assert_eq!(config.cli_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_bad_timeout() {
        let err = SuiteConfig::from_lookup(|key| {
            (key == CLI_TIMEOUT_ENV).then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
