use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use stundenplan_core::{
    FeedConfig, FeedNormalizer, LessonEvent,
    cache::{FeedIngestor, TimetableSource},
    queries,
    subjects::SubjectResolver,
};

/// Ingest once: remote fetch with snapshot fallback, then classify.
async fn load_events(config: FeedConfig) -> Result<Vec<LessonEvent>> {
    tracing::info!("ingesting timetable feed");
    let ingestor = FeedIngestor::new(config);
    let events = ingestor.load().await?;
    tracing::info!(events = events.len(), "timetable ingested");
    Ok(events)
}

fn local_now(config: &FeedConfig) -> DateTime<Tz> {
    Utc::now().with_timezone(&config.timezone)
}

fn print_lesson(event: &LessonEvent) {
    let mut line = format!(
        "{}–{}  {}",
        event.start.format("%H:%M"),
        event.end.format("%H:%M"),
        event.display_summary
    );
    if event.is_exam {
        line.push_str(" [Prüfung]");
    }
    if let Some(note) = event.special_note {
        line.push_str(&format!(" [{}]", note.as_str()));
    }
    println!("{line}");
    if !event.description.is_empty() {
        println!("       {}", event.description);
    }
}

fn print_json(events: &[&LessonEvent]) -> Result<()> {
    let views: Vec<_> = events.iter().map(|e| e.view()).collect();
    println!("{}", serde_json::to_string_pretty(&views)?);
    Ok(())
}

/// What is running right now.
pub async fn now_command(config: FeedConfig, json: bool) -> Result<()> {
    let now = local_now(&config);
    let events = load_events(config).await?;

    match queries::current_lesson(&events, now) {
        Some(lesson) if json => print_json(&[lesson])?,
        Some(lesson) => {
            print_lesson(lesson);
            let resolver = SubjectResolver::default();
            if let Some(link) = resolver.notebook_link(&lesson.subject) {
                println!("       Notizbuch: {link}");
            }
        }
        None => println!("Keine Lektion im Moment."),
    }
    Ok(())
}

/// The next upcoming lesson.
pub async fn next_command(config: FeedConfig, json: bool) -> Result<()> {
    let now = local_now(&config);
    let events = load_events(config).await?;

    match queries::next_lesson(&events, now) {
        Some(lesson) if json => print_json(&[lesson])?,
        Some(lesson) => {
            println!("Nächste Lektion am {}:", lesson.start.format("%d.%m.%Y"));
            print_lesson(lesson);
        }
        None => println!("Keine kommende Lektion gefunden."),
    }
    Ok(())
}

/// Today's remaining lessons.
pub async fn today_command(config: FeedConfig, json: bool) -> Result<()> {
    let now = local_now(&config);
    let events = load_events(config).await?;

    let today = queries::lessons_today(&events, now);
    if json {
        return print_json(&today);
    }
    if today.is_empty() {
        println!("Heute keine Lektionen mehr.");
    } else {
        println!("Heute, {}:", now.format("%d.%m.%Y"));
        for lesson in today {
            print_lesson(lesson);
        }
    }
    Ok(())
}

/// The current week grouped by day.
pub async fn week_command(config: FeedConfig, json: bool) -> Result<()> {
    let now = local_now(&config);
    let events = load_events(config).await?;

    let week = queries::week_lessons(&events, now);
    if json {
        let grouped: std::collections::BTreeMap<_, Vec<_>> = week
            .into_iter()
            .map(|(day, lessons)| (day, lessons.iter().map(|l| l.view()).collect()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&grouped)?);
        return Ok(());
    }

    if week.is_empty() {
        println!("Keine Lektionen in dieser Woche.");
    }
    for (day, lessons) in week {
        println!("{}:", day.format("%A, %d.%m.%Y"));
        for lesson in lessons {
            print_lesson(lesson);
        }
        println!();
    }
    Ok(())
}

/// The next `count` exams.
pub async fn exams_command(config: FeedConfig, count: usize, json: bool) -> Result<()> {
    let now = local_now(&config);
    let events = load_events(config).await?;

    let exams = queries::upcoming_exams(&events, now, count);
    if json {
        return print_json(&exams);
    }
    if exams.is_empty() {
        println!("Keine kommenden Prüfungen.");
    }
    for exam in exams {
        println!("{}:", exam.start.format("%d.%m.%Y"));
        print_lesson(exam);
    }
    Ok(())
}

/// One-shot fetch and normalize, writing the intermediate table.
pub async fn fetch_command(config: FeedConfig, output: Option<String>) -> Result<()> {
    let normalizer = FeedNormalizer::new(config);
    tracing::info!("fetching timetable feed");
    let feed = normalizer.fetch_remote().await?;
    let records = FeedNormalizer::normalize(&feed);
    tracing::info!(records = records.len(), "feed normalized");
    let table = FeedNormalizer::to_table(&records)?;

    let output =
        output.unwrap_or_else(|| normalizer.config().snapshot_path.display().to_string());
    std::fs::write(&output, &table)?;
    println!("✓ {} Einträge normalisiert nach {}", records.len(), output);
    Ok(())
}
