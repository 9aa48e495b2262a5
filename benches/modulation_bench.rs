use botchat::mood::{self, Mood};
use botchat::personality::modulate;
use botchat::prompt::compose;
use botchat::types::{Bot, BotMemory, Personality};
use chrono::Utc;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use uuid::Uuid;

const REPLY: &str = "I think that is a great idea. You can't go wrong with pasta, it's \
                     easy to make. Let me know how it turns out! We could also try a \
                     new sauce next time.";

fn bench_modulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("modulate");

    for (label, level) in [("low", 10), ("mid", 50), ("high", 90)] {
        let personality = match Personality::new(level, level, level, level) {
            Ok(p) => p,
            Err(e) => panic!("personality: {e}"),
        };
        group.bench_with_input(BenchmarkId::from_parameter(label), &personality, |b, p| {
            b.iter(|| black_box(modulate(black_box(REPLY), p, Some(Mood::Sad))));
        });
    }

    group.finish();
}

fn bench_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("mood_detect");

    for repeat in [1usize, 10, 100] {
        let text = "I'm so tired and a bit worried about tomorrow, but thanks for listening! "
            .repeat(repeat);
        group.bench_with_input(BenchmarkId::from_parameter(repeat), &text, |b, text| {
            b.iter(|| black_box(mood::detect(black_box(text))));
        });
    }

    group.finish();
}

fn bench_compose(c: &mut Criterion) {
    let now = Utc::now();
    let bot = Bot {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        name: "Pip".into(),
        role: "cooking buddy".into(),
        tone: "cheerful".into(),
        emoji: "🍝".into(),
        color: "#f97316".into(),
        description: Some("Loves Italian food".into()),
        system_prompt: None,
        background_story: Some("Grew up in a trattoria.".into()),
        personality: Personality::new(70, 80, 60, 30).ok(),
        voice: None,
        avatar_style: None,
        created_at: now,
        updated_at: now,
    };
    let mut memory = BotMemory::empty(bot.id, bot.user_id);
    memory.summary = "User likes pasta and lives in Lisbon.".into();
    memory.important_dates = vec!["birthday: March 3".into()];
    memory.learned_responses = (0..20).map(|i| format!("note {i}")).collect();
    let profile = mood::detect("I'm excited about dinner tonight!");

    c.bench_function("prompt_compose", |b| {
        b.iter(|| {
            black_box(compose(
                black_box(&bot),
                Some(&profile),
                Some(&memory),
                None,
            ))
        });
    });
}

criterion_group!(benches, bench_modulate, bench_detect, bench_compose);
criterion_main!(benches);
