// src/sys/proxy.rs

use tracing::{debug, info, warn};

use crate::sys::traits::RemoteShell;

/// Manages the single nginx site the deployment owns on the remote host.
/// Install order is fixed: write site, make it the sole enabled site, check
/// syntax, and only then reload. A failed syntax check leaves the previously
/// active configuration untouched.
pub struct NginxSiteManager {
    site_name: String,
}

/// Renders the server block: all port-80 traffic forwarded to the internal
/// container port on loopback, client identity preserved in standard headers.
pub fn render_site(internal_port: u16) -> String {
    format!(
        r#"server {{
    listen 80 default_server;
    server_name _;

    location / {{
        proxy_pass http://127.0.0.1:{port};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}
}}
"#,
        port = internal_port
    )
}

impl NginxSiteManager {
    pub fn new(site_name: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
        }
    }

    fn available_path(&self) -> String {
        format!("/etc/nginx/sites-available/{}", self.site_name)
    }

    fn enabled_path(&self) -> String {
        format!("/etc/nginx/sites-enabled/{}", self.site_name)
    }

    pub async fn install_site(
        &self,
        shell: &dyn RemoteShell,
        internal_port: u16,
    ) -> Result<(), String> {
        let content = render_site(internal_port);

        // Quoted heredoc delimiter: nginx variables like $host must reach the
        // file verbatim, not be expanded by the remote shell.
        let write = shell
            .run(&format!(
                "sudo tee {path} > /dev/null <<'DECKHAND_SITE'\n{content}DECKHAND_SITE",
                path = self.available_path(),
                content = content
            ))
            .await?;
        if !write.success() {
            return Err(format!(
                "writing nginx site failed (exit {}): {}",
                write.exit_code,
                write.stderr.trim()
            ));
        }

        // Sole enabled site; also what makes re-runs converge to one site.
        let enable = shell
            .run(&format!(
                "sudo rm -f /etc/nginx/sites-enabled/* && sudo ln -sfn {avail} {enabled}",
                avail = self.available_path(),
                enabled = self.enabled_path()
            ))
            .await?;
        if !enable.success() {
            return Err(format!(
                "enabling nginx site failed (exit {}): {}",
                enable.exit_code,
                enable.stderr.trim()
            ));
        }

        let check = shell.run("sudo nginx -t").await?;
        if !check.success() {
            // Never reload with a broken config.
            return Err(format!(
                "nginx configuration check failed: {}",
                check.stderr.trim()
            ));
        }
        debug!("nginx configuration check passed");

        let reload = shell
            .run("sudo systemctl reload nginx || sudo systemctl restart nginx")
            .await?;
        if !reload.success() {
            return Err(format!(
                "nginx reload and restart both failed: {}",
                reload.stderr.trim()
            ));
        }
        info!(site = %self.site_name, port = internal_port, "nginx forwarding 80 -> 127.0.0.1:{}", internal_port);
        Ok(())
    }

    /// Cleanup-mode removal; absent files are success.
    pub async fn remove_site(&self, shell: &dyn RemoteShell) {
        let script = format!(
            "sudo rm -f {enabled} {avail}",
            enabled = self.enabled_path(),
            avail = self.available_path()
        );
        match shell.run(&script).await {
            Ok(out) if out.success() => debug!(site = %self.site_name, "site files removed"),
            Ok(out) => debug!(exit_code = out.exit_code, "site files already absent"),
            Err(e) => warn!(error = %e, "site removal could not run, continuing"),
        }
    }
}
