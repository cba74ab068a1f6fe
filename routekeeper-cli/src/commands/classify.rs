//! Error classification command.
//!
//! Shows how the recovery engine would treat a failure: its class, whether
//! that class gets automatic recovery, and the retry budget it runs with.

use clap::Args;
use routekeeper::recovery::{
    classify, matching_rule, ErrorClass, ErrorContext, Failure, ServiceHint, StrategyRecord,
};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Error message as reported by the failing component
    pub message: String,

    /// HTTP status of the failed response
    #[arg(long)]
    pub status: Option<u16>,

    /// Error code returned by the server
    #[arg(long)]
    pub code: Option<String>,

    /// Service that raised the failure: network, location, api, storage, map, sync
    #[arg(long)]
    pub service: Option<String>,
}

/// Result of classifying one failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub class: ErrorClass,
    /// Name of the table rule that matched, or `None` when a service hint decided.
    pub rule: Option<&'static str>,
    pub strategy: StrategyRecord,
}

pub fn classify_args(args: &ClassifyArgs) -> Result<Classification, CliError> {
    let mut failure = Failure::new(args.message.clone());
    if let Some(status) = args.status {
        failure = failure.with_status(status);
    }
    if let Some(code) = &args.code {
        failure = failure.with_code(code.clone());
    }

    let mut context = ErrorContext::new();
    if let Some(service) = &args.service {
        let hint: ServiceHint = service.parse().map_err(CliError::InvalidArgument)?;
        context = context.service(hint);
    }

    let class = classify(&failure, &context);
    let rule = match context.service {
        Some(_) => None,
        None => matching_rule(&failure).map(|rule| rule.name),
    };

    Ok(Classification {
        class,
        rule,
        strategy: StrategyRecord::for_class(class),
    })
}

/// Run the classify command.
pub fn run(args: ClassifyArgs) -> Result<(), CliError> {
    let result = classify_args(&args)?;
    let strategy = &result.strategy;

    println!("class:       {}", result.class);
    println!(
        "critical:    {}",
        if result.class.is_critical() { "yes" } else { "no" }
    );
    match result.rule {
        Some(rule) => println!("matched by:  {}", rule),
        None if args.service.is_some() => println!("matched by:  service hint"),
        None => println!("matched by:  (no rule)"),
    }
    println!(
        "strategy:    {} attempt(s), {} ms base delay, {}",
        strategy.max_retries,
        strategy.base_delay.as_millis(),
        if strategy.exponential {
            "exponential"
        } else {
            "fixed"
        }
    );
    Ok(())
}
