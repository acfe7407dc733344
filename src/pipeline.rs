//! The task trees behind the `clean`, `build` and `dev` commands.
//!
//! ```text
//! build = series(clean, parallel(series(compile, optimize), images, fonts, extras))
//! dev   = series(clean, compile, serve)
//! compile = parallel(markup, script, style)
//! ```

use std::sync::Arc;

use crate::Website;
use crate::asset::Category;
use crate::context::Environment;
use crate::engine::{Task, parallel, sequential, task};

pub fn clean(site: &Arc<Website>) -> Task {
    let site = site.clone();
    task("clean", move || crate::clean::clean(&site))
}

/// One transform stage writing into staging.
pub fn stage(site: &Arc<Website>, env: Environment, category: Category) -> Task {
    let site = site.clone();
    task(category.name(), move || {
        crate::transform::run_stage(&site, &env, category).map(|_| ())
    })
}

pub fn compile(site: &Arc<Website>, env: Environment) -> Task {
    parallel(Category::TRANSFORMED.map(|category| stage(site, env, category)))
}

pub fn optimize(site: &Arc<Website>) -> Task {
    let site = site.clone();
    task("optimize", move || crate::optimize::optimize(&site).map(|_| ()))
}

/// Copies one category of untransformed assets into the output.
pub fn copy(site: &Arc<Website>, category: Category) -> Task {
    let site = site.clone();
    let name = match category {
        Category::Image => "images",
        Category::Font => "fonts",
        _ => "extras",
    };

    task(name, move || crate::copy::copy_category(&site, category).map(|_| ()))
}

pub fn build(site: &Arc<Website>) -> Task {
    let env = Environment::build();

    sequential([
        clean(site),
        parallel([
            sequential([compile(site, env), optimize(site)]),
            copy(site, Category::Image),
            copy(site, Category::Font),
            copy(site, Category::Extra),
        ]),
    ])
}

/// Compiles into staging and hands over to the watch server, which runs
/// until interrupted. `socket` is the already bound live reload listener,
/// so its port can be baked into the staged pages.
#[cfg(feature = "live")]
pub fn dev(site: &Arc<Website>, socket: Arc<std::net::TcpListener>) -> Task {
    let port = socket.local_addr().map(|addr| addr.port()).unwrap_or(site.config.reload_port);
    let env = Environment::watch(port);

    let serve = {
        let site = site.clone();
        task("serve", move || {
            crate::engine::watch::serve(&site, env, socket.clone())
        })
    };

    sequential([clean(site), compile(site, env), serve])
}
