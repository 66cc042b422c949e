use super::harness::{Workspace, parse_gemset};

pub type Scenario = fn(&Workspace) -> Result<(), String>;

pub fn scenarios() -> Vec<(&'static str, Scenario)> {
    vec![
        ("help", help as Scenario),
        ("writes_nix_by_default", writes_nix_by_default as Scenario),
        ("writes_json", writes_json as Scenario),
        ("json_rerun_is_stable", json_rerun_is_stable as Scenario),
        ("dry_run_writes_nothing", dry_run_writes_nothing as Scenario),
        ("explicit_paths_from_elsewhere", explicit_paths_from_elsewhere as Scenario),
        ("quiet_run_is_silent", quiet_run_is_silent as Scenario),
        ("ruby_blocks_in_gemfile", ruby_blocks_in_gemfile as Scenario),
        ("missing_lockfile", missing_lockfile as Scenario),
        ("unsatisfied_dependency", unsatisfied_dependency as Scenario),
        ("unknown_source", unknown_source as Scenario),
    ]
}

const GEMFILE: &str = r#"source "https://rubygems.org"

gem "alpha", path: "engines/alpha"

group :test do
  gem "beta", path: "engines/beta"
end
"#;

const LOCKFILE: &str = r#"PATH
  remote: engines/alpha
  specs:
    alpha (0.1.0)
      beta

PATH
  remote: engines/beta
  specs:
    beta (0.2.0)

PLATFORMS
  ruby

DEPENDENCIES
  alpha!
  beta!

BUNDLED WITH
   2.5.3
"#;

const ALPHA_NIX: &str = r#"  alpha = {
    dependencies = ["beta"];
    groups = ["default"];
    platforms = [];
    source = {
      path = "engines/alpha";
      type = "path";
    };
    targets = [];
    version = "0.1.0";
  };
"#;

fn help(ws: &Workspace) -> Result<(), String> {
    let project = ws.project("help")?;
    project
        .gemset(&["--help"])?
        .succeeded()?
        .printed("--lockfile")?
        .printed("--dry-run")?;
    Ok(())
}

fn writes_nix_by_default(ws: &Workspace) -> Result<(), String> {
    let project = ws.project("nix")?;
    project.bundle(GEMFILE, LOCKFILE)?;

    project
        .gemset(&[])?
        .succeeded()?
        .reported("Wrote gemset.nix")?
        .reported("0 reused, 2 resolved, 0 failed")?;

    let nix = project.read("gemset.nix")?;
    if !nix.starts_with("{\n") || !nix.ends_with("}\n") || !nix.contains(ALPHA_NIX) {
        return Err(format!("unexpected gemset.nix:\n{}", nix));
    }
    // alpha's default group does not widen beta's
    if !nix.contains("groups = [\"test\"];") {
        return Err(format!("beta lost its test group:\n{}", nix));
    }
    Ok(())
}

fn writes_json(ws: &Workspace) -> Result<(), String> {
    let project = ws.project("json")?;
    project.bundle(GEMFILE, LOCKFILE)?;

    project.gemset(&["--json"])?.succeeded()?.reported("Wrote gemset.json")?;
    if project.exists("gemset.nix") {
        return Err("--json also wrote gemset.nix".to_string());
    }

    let gemset = project.gemset_json("gemset.json")?;
    let alpha = &gemset["alpha"];
    if alpha["source"] != serde_json::json!({"type": "path", "path": "engines/alpha"}) {
        return Err(format!("alpha source: {}", alpha["source"]));
    }
    if alpha["dependencies"] != serde_json::json!(["beta"]) {
        return Err(format!("alpha dependencies: {}", alpha["dependencies"]));
    }
    let beta = &gemset["beta"];
    if beta["groups"] != serde_json::json!(["test"]) || beta.get("dependencies").is_some() {
        return Err(format!("beta entry: {}", beta));
    }
    Ok(())
}

fn json_rerun_is_stable(ws: &Workspace) -> Result<(), String> {
    let project = ws.project("rerun")?;
    project.bundle(GEMFILE, LOCKFILE)?;

    project.gemset(&["--json"])?.succeeded()?;
    let first = project.read("gemset.json")?;
    project.gemset(&["--json"])?.succeeded()?;
    let second = project.read("gemset.json")?;

    if first != second {
        return Err(format!("rerun changed the gemset:\n{}\n---\n{}", first, second));
    }
    Ok(())
}

fn dry_run_writes_nothing(ws: &Workspace) -> Result<(), String> {
    let project = ws.project("dry-run")?;
    project.bundle(GEMFILE, LOCKFILE)?;

    let run = project.gemset(&["--dry-run", "--json"])?;
    run.succeeded()?.reported("2 resolved")?;

    let gemset = parse_gemset(&run.stdout)?;
    if gemset["beta"]["version"] != "0.2.0" {
        return Err(format!("unexpected output:\n{}", run.stdout));
    }
    if run.stderr.contains("Wrote") || project.exists("gemset.json") || project.exists("gemset.nix") {
        return Err("dry run wrote a gemset".to_string());
    }
    Ok(())
}

fn explicit_paths_from_elsewhere(ws: &Workspace) -> Result<(), String> {
    let project = ws.project("explicit")?;
    project.bundle(GEMFILE, LOCKFILE)?;
    project.write("elsewhere/.keep", "")?;
    project.write("nix/.keep", "")?;

    let gemfile = project.path("Gemfile").to_string_lossy().into_owned();
    let out = project.path("nix/deps.nix").to_string_lossy().into_owned();
    project
        .gemset_in(&project.path("elsewhere"), &["--gemfile", &gemfile, "--gemset", &out])?
        .succeeded()?;

    let nix = project.read("nix/deps.nix")?;
    if !nix.contains("path = \"engines/beta\";") {
        return Err(format!("unexpected nix/deps.nix:\n{}", nix));
    }
    Ok(())
}

fn quiet_run_is_silent(ws: &Workspace) -> Result<(), String> {
    let project = ws.project("quiet")?;
    project.bundle(GEMFILE, LOCKFILE)?;

    let run = project.gemset(&["--quiet"])?;
    run.succeeded()?;
    if !run.stderr.trim().is_empty() {
        return Err(format!("--quiet printed:\n{}", run.stderr));
    }
    if !project.exists("gemset.nix") {
        return Err("gemset.nix not written".to_string());
    }
    Ok(())
}

fn ruby_blocks_in_gemfile(ws: &Workspace) -> Result<(), String> {
    let project = ws.project("ruby-blocks")?;
    let gemfile = r#"source "https://rubygems.org"

git_source(:github) do |
  repo|
  "https://github.com/#{repo}.git"
end

gem "alpha", path: "engines/alpha"

group :development,
      :test do
  gem "beta", path: "engines/beta"
end
"#;
    project.bundle(gemfile, LOCKFILE)?;

    project.gemset(&["--json"])?.succeeded()?;
    let gemset = project.gemset_json("gemset.json")?;
    if gemset["beta"]["groups"] != serde_json::json!(["development", "test"]) {
        return Err(format!("beta groups: {}", gemset["beta"]["groups"]));
    }
    Ok(())
}

fn missing_lockfile(ws: &Workspace) -> Result<(), String> {
    let project = ws.project("no-lock")?;
    project.write("Gemfile", GEMFILE)?;

    project
        .gemset(&[])?
        .failed_with("No lockfile found")?
        .reported("bundle lock")?;
    Ok(())
}

fn unsatisfied_dependency(ws: &Workspace) -> Result<(), String> {
    let project = ws.project("unsatisfied")?;
    project.bundle(
        "gem \"alpha\", path: \"engines/alpha\"\n",
        "PATH\n  remote: engines/alpha\n  specs:\n    alpha (0.1.0)\n      gamma\n\nDEPENDENCIES\n  alpha!\n",
    )?;

    project
        .gemset(&[])?
        .failed_with("'gamma'")?
        .reported("not specified in the lockfile")?;
    if project.exists("gemset.nix") {
        return Err("gemset written after a fatal error".to_string());
    }
    Ok(())
}

fn unknown_source(ws: &Workspace) -> Result<(), String> {
    let project = ws.project("plugin-source")?;
    project.bundle(
        "gem \"odd\"\n",
        "PLUGIN SOURCE\n  remote: https://plugins.example\n  type: custom\n  specs:\n    odd (1.0)\n\nDEPENDENCIES\n  odd\n",
    )?;

    project.gemset(&[])?.failed_with("Unknown bundler source")?;
    Ok(())
}
