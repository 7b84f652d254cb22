//! Instance registry and save listing commands.

use std::path::PathBuf;

use anyhow::{Context, bail};
use backup_catalog::Catalog;
use backup_core::{CoreError, NewInstance};
use chrono::{Local, TimeZone};

pub struct AddInstance {
    pub container: String,
    pub dir: String,
    pub bucket: String,
    pub prefix: String,
    pub working_path: PathBuf,
    pub description: Option<String>,
    pub keep_inventory: bool,
}

pub async fn add_instance(catalog: &Catalog, args: AddInstance) -> anyhow::Result<()> {
    if !args.working_path.is_absolute() {
        return Err(CoreError::path(&args.working_path)).context("working path must be absolute");
    }
    if !args.working_path.join(&args.dir).is_dir() {
        println!(
            "warning: {} does not exist yet",
            args.working_path.join(&args.dir).display()
        );
    }

    let instance = catalog
        .add_instance(NewInstance {
            container: args.container,
            description: args.description,
            dir_name: args.dir,
            keep_inventory: args.keep_inventory,
            bucket: args.bucket,
            prefix: args.prefix,
            working_path: args.working_path,
        })
        .await
        .context("registering instance")?;
    println!("registered {} as instance {}", instance.container, instance.id);
    Ok(())
}

pub async fn list_instances(catalog: &Catalog) -> anyhow::Result<()> {
    let instances = catalog.instances().await.context("reading instances")?;
    if instances.is_empty() {
        println!("no instances registered");
        return Ok(());
    }
    for instance in instances {
        println!(
            "{:>4}  {:<20} {:<8} s3://{}/{}  {}{}",
            instance.id,
            instance.container,
            if instance.active { "active" } else { "disabled" },
            instance.bucket,
            instance.prefix,
            instance.world_dir().display(),
            instance
                .description
                .map(|d| format!("  ({d})"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

pub async fn set_active(catalog: &Catalog, container: &str, active: bool) -> anyhow::Result<()> {
    catalog
        .set_active(container, active)
        .await
        .with_context(|| format!("updating {container}"))?;
    println!(
        "{container} {}",
        if active { "enabled" } else { "disabled" }
    );
    Ok(())
}

pub async fn list_saves(catalog: &Catalog, container: &str, all: bool) -> anyhow::Result<()> {
    let Some(instance) = catalog
        .instance_by_container(container)
        .await
        .context("looking up instance")?
    else {
        bail!("no instance named {container}");
    };

    let saves = if all {
        catalog.saves(instance.id).await
    } else {
        catalog.live_saves(instance.id).await
    }
    .context("reading saves")?;

    for save in saves {
        let created = Local
            .timestamp_millis_opt(save.created_at_ms)
            .single()
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| save.created_at_ms.to_string());
        println!(
            "{:>6}  {}  {:>12}  {}{}",
            save.id,
            created,
            save.size,
            save.filename,
            if save.deleted { "  (deleted)" } else { "" }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_instance(container: &str, working_path: PathBuf) -> AddInstance {
        AddInstance {
            container: container.to_string(),
            dir: "world".to_string(),
            bucket: "mc-backups".to_string(),
            prefix: container.to_string(),
            working_path,
            description: Some("test server".to_string()),
            keep_inventory: true,
        }
    }

    #[tokio::test]
    async fn add_then_disable() {
        let catalog = Catalog::open_in_memory().await.expect("catalog");
        let dir = std::env::temp_dir();

        add_instance(&catalog, new_instance("survival", dir.clone()))
            .await
            .expect("add");
        set_active(&catalog, "survival", false).await.expect("disable");

        let instances = catalog.instances().await.expect("instances");
        assert_eq!(instances.len(), 1);
        assert!(instances[0].keep_inventory);
        assert!(!instances[0].active);
        assert!(catalog.active_instances().await.expect("active").is_empty());
    }

    #[tokio::test]
    async fn relative_working_path_is_rejected() {
        let catalog = Catalog::open_in_memory().await.expect("catalog");
        let result = add_instance(&catalog, new_instance("survival", PathBuf::from("servers/a"))).await;
        assert!(result.is_err());
        assert!(catalog.instances().await.expect("instances").is_empty());
    }

    #[tokio::test]
    async fn saves_for_unknown_instance_fail() {
        let catalog = Catalog::open_in_memory().await.expect("catalog");
        assert!(list_saves(&catalog, "nope", false).await.is_err());
    }
}
